//! Bounded hand-off between the decode thread and the playback consumer.
//!
//! - `FrameSink::push` blocks while the queue is full (backpressure)
//! - Dropping the sink is the "producer done" signal
//! - The consumer only observes closure after every buffered frame is popped

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};

use crate::frame::RenderableFrame;

/// Capacity used when the configuration does not override it.
pub const DEFAULT_CAPACITY: usize = 1024;

/// How often a blocked push wakes up to look at the stop signal.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared cancellation flag, polled by producers between units of work.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Stop was requested while waiting for room.
    Stopped,
    /// The consumer side has been dropped.
    Disconnected,
}

/// Result of a non-blocking pop.
#[derive(Debug)]
pub enum Poll {
    Frame(RenderableFrame),
    /// Nothing buffered yet; the producer is still running.
    Empty,
    /// Producer finished and every buffered frame has been consumed.
    Closed,
}

/// Create a queue holding at most `capacity` frames (at least one).
pub fn bounded(capacity: usize, stop: StopSignal) -> (FrameSink, FrameQueue) {
    // Zero would make crossbeam build a rendezvous channel.
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let done = Arc::new(AtomicBool::new(false));
    (
        FrameSink {
            tx,
            stop,
            done: done.clone(),
        },
        FrameQueue { rx, done, capacity },
    )
}

/// Producer end. Exactly one per queue.
pub struct FrameSink {
    tx: Sender<RenderableFrame>,
    stop: StopSignal,
    done: Arc<AtomicBool>,
}

impl FrameSink {
    /// Push a frame, blocking while the queue is full.
    pub fn push(&self, frame: RenderableFrame) -> Result<(), PushError> {
        let mut frame = frame;
        loop {
            if self.stop.is_requested() {
                return Err(PushError::Stopped);
            }
            match self.tx.send_timeout(frame, STOP_POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(f)) => frame = f,
                Err(SendTimeoutError::Disconnected(_)) => return Err(PushError::Disconnected),
            }
        }
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_requested()
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        // Every send has completed by now, so a consumer that sees `done`
        // and an empty channel has drained everything.
        self.done.store(true, Ordering::Release);
    }
}

/// Consumer end.
pub struct FrameQueue {
    rx: Receiver<RenderableFrame>,
    done: Arc<AtomicBool>,
    capacity: usize,
}

impl FrameQueue {
    /// Block until a frame arrives. `None` once closed and drained.
    pub fn pop(&self) -> Option<RenderableFrame> {
        self.rx.recv().ok()
    }

    /// Block for at most `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Poll {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Poll::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Poll::Empty,
            Err(RecvTimeoutError::Disconnected) => Poll::Closed,
        }
    }

    /// Never blocks; safe to call from the host tick.
    pub fn try_pop(&self) -> Poll {
        match self.rx.try_recv() {
            Ok(frame) => Poll::Frame(frame),
            Err(TryRecvError::Empty) => Poll::Empty,
            Err(TryRecvError::Disconnected) => Poll::Closed,
        }
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the producer is done and nothing is left to pop.
    pub fn is_closed(&self) -> bool {
        self.done.load(Ordering::Acquire) && self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DrawTransform, PixelBuffer, PixelFormat};
    use std::time::Instant;

    fn frame(index: usize) -> RenderableFrame {
        RenderableFrame {
            index,
            buffer: PixelBuffer::new(1, 1, PixelFormat::Rgba8, vec![index as u8; 4]).unwrap(),
            transform: DrawTransform::IDENTITY,
        }
    }

    #[test]
    fn fifo_order() {
        let (sink, queue) = bounded(8, StopSignal::new());
        for i in 0..5 {
            sink.push(frame(i)).unwrap();
        }
        drop(sink);
        let order: Vec<usize> = std::iter::from_fn(|| queue.pop()).map(|f| f.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn zero_capacity_holds_one_frame() {
        let (sink, queue) = bounded(0, StopSignal::new());
        assert_eq!(queue.capacity(), 1);
        sink.push(frame(0)).unwrap();
        assert_eq!(queue.len(), queue.capacity());
        assert!(matches!(queue.try_pop(), Poll::Frame(f) if f.index == 0));
    }

    #[test]
    fn drains_before_close() {
        let (sink, queue) = bounded(4, StopSignal::new());
        sink.push(frame(0)).unwrap();
        sink.push(frame(1)).unwrap();
        sink.push(frame(2)).unwrap();
        drop(sink);

        for expected in 0..3 {
            assert!(!queue.is_closed(), "closed with {} frames buffered", queue.len());
            match queue.try_pop() {
                Poll::Frame(f) => assert_eq!(f.index, expected),
                other => panic!("expected frame {expected}, got {other:?}"),
            }
        }
        assert!(queue.is_closed());
        assert!(matches!(queue.try_pop(), Poll::Closed));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn empty_is_not_closed_while_producer_lives() {
        let (sink, queue) = bounded(2, StopSignal::new());
        assert!(matches!(queue.try_pop(), Poll::Empty));
        assert!(!queue.is_closed());
        drop(sink);
        assert!(matches!(queue.try_pop(), Poll::Closed));
    }

    #[test]
    fn full_queue_applies_backpressure() {
        let (sink, queue) = bounded(2, StopSignal::new());
        let producer = std::thread::spawn(move || {
            for i in 0..5 {
                sink.push(frame(i)).unwrap();
            }
        });

        // Give the producer time to fill up; it must not get past capacity.
        std::thread::sleep(Duration::from_millis(100));
        assert!(queue.len() <= 2);

        let mut seen = Vec::new();
        while let Some(f) = queue.pop() {
            seen.push(f.index);
        }
        producer.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn stop_releases_blocked_push() {
        let stop = StopSignal::new();
        let (sink, _queue) = bounded(1, stop.clone());
        sink.push(frame(0)).unwrap();

        let producer = std::thread::spawn(move || sink.push(frame(1)));
        std::thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        stop.request();
        assert_eq!(producer.join().unwrap(), Err(PushError::Stopped));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn push_fails_once_consumer_is_gone() {
        let (sink, queue) = bounded(1, StopSignal::new());
        drop(queue);
        assert_eq!(sink.push(frame(0)), Err(PushError::Disconnected));
    }
}
