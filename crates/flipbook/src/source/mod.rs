pub mod still;
#[cfg(feature = "video")]
pub mod video;

use std::thread::JoinHandle;

use crate::error::{Result, SequenceError};
use crate::queue::{self, FrameQueue, FrameSink, PushError, StopSignal};

/// Something that decodes frames and pushes them into a sink.
///
/// `produce` runs on the source thread. It returns the number of frames
/// pushed; returning (with `Ok` or `Err`) closes the queue.
pub trait FrameProducer: Send + 'static {
    fn name(&self) -> String;

    fn produce(&mut self, sink: &FrameSink) -> Result<usize>;
}

impl From<PushError> for SequenceError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::Stopped | PushError::Disconnected => SequenceError::Stopped,
        }
    }
}

/// A producer running on its own thread, plus the consumer end of its queue.
pub struct FrameSource {
    queue: FrameQueue,
    stop: StopSignal,
    thread: Option<JoinHandle<Result<usize>>>,
    produced: Option<usize>,
    error: Option<SequenceError>,
    name: String,
}

impl FrameSource {
    pub fn spawn<P: FrameProducer>(mut producer: P, capacity: usize) -> Result<Self> {
        let stop = StopSignal::new();
        let (sink, queue) = queue::bounded(capacity, stop.clone());
        let name = producer.name();
        let thread_name = name.clone();

        let handle = std::thread::Builder::new()
            .name("frame-source".into())
            .spawn(move || {
                log::info!("Frame source started: {thread_name}");
                let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    producer.produce(&sink)
                })) {
                    Ok(result) => result,
                    Err(e) => {
                        let msg = if let Some(s) = e.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = e.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".into()
                        };
                        Err(SequenceError::SourcePanicked(msg))
                    }
                };
                // Close the queue before the handle is joined.
                drop(sink);
                match &result {
                    Ok(count) => log::info!("Frame source finished: {thread_name}, {count} frames"),
                    Err(SequenceError::Stopped) => log::info!("Frame source stopped: {thread_name}"),
                    Err(e) => log::error!("Frame source failed: {thread_name}: {e}"),
                }
                result
            })
            .map_err(|e| SequenceError::Config(format!("failed to spawn frame source thread: {e}")))?;

        Ok(Self {
            queue,
            stop,
            thread: Some(handle),
            produced: None,
            error: None,
            name,
        })
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the producer to stop and wait for it to release its resources.
    pub fn stop(&mut self) {
        self.stop.request();
        self.join();
    }

    /// Whether the producer thread is still alive.
    pub fn is_running(&self) -> bool {
        match &self.thread {
            Some(h) => !h.is_finished(),
            None => false,
        }
    }

    /// Wait for the producer thread. Returns the number of frames it pushed,
    /// or `None` if it failed (see [`FrameSource::error`]).
    pub fn join(&mut self) -> Option<usize> {
        if let Some(handle) = self.thread.take() {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(SequenceError::SourcePanicked("join failed".into())));
            match result {
                Ok(count) => self.produced = Some(count),
                Err(e) => self.error = Some(e),
            }
        }
        self.produced
    }

    /// The producer's error, once it has been joined.
    pub fn error(&self) -> Option<&SequenceError> {
        self.error.as_ref()
    }

    /// Join the producer and take its error, if it failed.
    pub fn take_error(&mut self) -> Option<SequenceError> {
        self.join();
        self.error.take()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}
