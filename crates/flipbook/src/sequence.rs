use serde::{Deserialize, Serialize};

use crate::clock::PlaybackClock;
use crate::error::{Result, SequenceError};
use crate::frame::RenderableFrame;
use crate::queue::Poll;
use crate::source::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Loading,
    Playing,
    Finished,
    /// The source failed before the last frame; see [`PlaybackSequence::error`].
    Aborted,
}

/// What an advance does when the producer has not caught up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallPolicy {
    /// Drop the advance and keep showing the current frame; never blocks the tick.
    #[default]
    Skip,
    /// Wait for the producer.
    Block,
}

/// Playback state for one sequence, updated once per host tick.
pub struct PlaybackSequence {
    source: FrameSource,
    clock: PlaybackClock,
    total_frames: usize,
    /// `total_frames` is an estimate and the closed queue decides the end.
    until_close: bool,
    current_frame_number: usize,
    current_frame: Option<RenderableFrame>,
    state: PlaybackState,
    source_frame_rate: u32,
    stall_policy: StallPolicy,
    stalls: usize,
    error: Option<SequenceError>,
}

impl PlaybackSequence {
    /// Take ownership of a running source and block until its first frame.
    ///
    /// Playback finishes after exactly `total_frames` advances; frames the
    /// source produces beyond that are never shown.
    pub fn start(
        source: FrameSource,
        total_frames: usize,
        source_frame_rate: u32,
        stall_policy: StallPolicy,
    ) -> Result<Self> {
        if total_frames == 0 {
            return Err(SequenceError::Config("total_frames must be positive".into()));
        }
        Self::begin(source, total_frames, false, source_frame_rate, stall_policy)
    }

    /// Like [`start`](Self::start), but playback runs until the source closes.
    ///
    /// `estimated_frames` is only a hint (a container's reported count may be
    /// zero or wrong); [`total_frames`](Self::total_frames) grows past it as
    /// frames keep arriving and settles on the delivered count at close.
    pub fn start_until_close(
        source: FrameSource,
        estimated_frames: usize,
        source_frame_rate: u32,
        stall_policy: StallPolicy,
    ) -> Result<Self> {
        Self::begin(
            source,
            estimated_frames.max(1),
            true,
            source_frame_rate,
            stall_policy,
        )
    }

    fn begin(
        source: FrameSource,
        total_frames: usize,
        until_close: bool,
        source_frame_rate: u32,
        stall_policy: StallPolicy,
    ) -> Result<Self> {
        if source_frame_rate == 0 {
            return Err(SequenceError::Config("source frame rate must be positive".into()));
        }

        let mut sequence = Self {
            source,
            clock: PlaybackClock::new(),
            total_frames,
            until_close,
            current_frame_number: 0,
            current_frame: None,
            state: PlaybackState::Loading,
            source_frame_rate,
            stall_policy,
            stalls: 0,
            error: None,
        };

        match sequence.source.queue().pop() {
            Some(frame) => {
                sequence.current_frame = Some(frame);
                sequence.state = PlaybackState::Playing;
                log::info!(
                    "Playback started: {} ({}{} frames @ {} fps)",
                    sequence.source.name(),
                    if until_close { "~" } else { "" },
                    total_frames,
                    source_frame_rate
                );
                Ok(sequence)
            }
            None => Err(sequence
                .source
                .take_error()
                .unwrap_or(SequenceError::NoFrames)),
        }
    }

    /// Advance playback by one host tick.
    ///
    /// Returns how many frames were advanced. Both rates must be positive;
    /// an invalid rate leaves the state untouched.
    pub fn update(&mut self, source_frame_rate: u32, tick_rate: u32) -> Result<u32> {
        if source_frame_rate == 0 || tick_rate == 0 {
            return Err(SequenceError::Config(format!(
                "rates must be positive (source {source_frame_rate}, tick {tick_rate})"
            )));
        }
        if self.state != PlaybackState::Playing {
            return Ok(0);
        }
        self.source_frame_rate = source_frame_rate;

        let due = self.clock.tick(source_frame_rate, tick_rate);
        let mut advanced = 0;
        for _ in 0..due {
            if !self.advance() {
                break;
            }
            advanced += 1;
        }
        Ok(advanced)
    }

    /// Update with the stored source frame rate.
    pub fn tick(&mut self, tick_rate: u32) -> Result<u32> {
        self.update(self.source_frame_rate, tick_rate)
    }

    /// Move one frame forward. Returns false when no advance happened.
    fn advance(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }

        // The advance that reaches a fixed total only ends playback; the frame
        // on screen is already the last one.
        if !self.until_close && self.current_frame_number + 1 >= self.total_frames {
            self.current_frame_number = self.total_frames;
            self.finish();
            return true;
        }

        let next = match self.stall_policy {
            StallPolicy::Skip => self.source.queue().try_pop(),
            StallPolicy::Block => match self.source.queue().pop() {
                Some(frame) => Poll::Frame(frame),
                None => Poll::Closed,
            },
        };

        match next {
            Poll::Frame(frame) => {
                self.current_frame = Some(frame);
                self.current_frame_number += 1;
                if self.current_frame_number >= self.total_frames {
                    // Only reachable while running until close: the estimate was low.
                    self.total_frames = self.current_frame_number + 1;
                }
            }
            Poll::Empty => {
                self.stalls += 1;
                log::debug!("Frame {} not ready, holding", self.current_frame_number + 1);
                return false;
            }
            Poll::Closed => {
                // Past the last delivered frame: count the advance, keep the picture.
                self.current_frame_number += 1;
                self.on_close();
            }
        }
        true
    }

    fn finish(&mut self) {
        self.state = PlaybackState::Finished;
        log::info!(
            "Playback finished: {} frames, {} stalled ticks",
            self.total_frames,
            self.stalls
        );
    }

    fn on_close(&mut self) {
        match self.source.take_error() {
            Some(err) => {
                log::error!(
                    "Playback aborted at frame {}/{}: {err}",
                    self.current_frame_number,
                    self.total_frames
                );
                self.error = Some(err);
                self.state = PlaybackState::Aborted;
            }
            None => {
                if !self.until_close {
                    log::info!(
                        "Source delivered {} of {} expected frames",
                        self.current_frame_number,
                        self.total_frames
                    );
                }
                self.total_frames = self.current_frame_number;
                self.finish();
            }
        }
    }

    /// The frame to paint. Stays on the last frame once finished.
    pub fn current_frame(&self) -> Option<&RenderableFrame> {
        self.current_frame.as_ref()
    }

    pub fn current_frame_number(&self) -> usize {
        self.current_frame_number
    }

    /// Frames in the sequence. While running until close this is a running
    /// estimate that never falls below `current_frame_number + 1` during playback.
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Whether the end is decided by the source closing rather than a fixed count.
    pub fn runs_until_close(&self) -> bool {
        self.until_close
    }

    pub fn partial_frame(&self) -> f64 {
        self.clock.partial_frame()
    }

    pub fn source_frame_rate(&self) -> u32 {
        self.source_frame_rate
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == PlaybackState::Finished
    }

    /// Ticks where a frame was due but the queue was empty.
    pub fn stalls(&self) -> usize {
        self.stalls
    }

    pub fn error(&self) -> Option<&SequenceError> {
        self.error.as_ref()
    }

    /// Frames decoded but not yet shown.
    pub fn buffered(&self) -> usize {
        self.source.queue().len()
    }

    /// Stop the producer early; the sequence keeps its current frame.
    pub fn stop(&mut self) {
        self.source.stop();
    }
}
