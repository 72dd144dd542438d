//! Frame-sequence playback for host render loops.
//!
//! A [`source::FrameSource`] decodes still images or a video stream on its own
//! thread into a bounded [`queue`]; a [`sequence::PlaybackSequence`] pulls from
//! it once per host tick, converting between the source frame rate and the
//! tick rate with a fractional [`clock::PlaybackClock`].

pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod host;
pub mod queue;
pub mod scaler;
pub mod sequence;
pub mod source;

pub use config::{SequenceConfig, SourceConfig, open_sequence};
pub use error::{Result, SequenceError};
pub use frame::{DrawTransform, PixelBuffer, PixelFormat, RenderableFrame};
pub use scaler::{ScaleMode, Scaler};
pub use sequence::{PlaybackSequence, PlaybackState, StallPolicy};
