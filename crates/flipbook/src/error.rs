use std::path::PathBuf;

use thiserror::Error;

use crate::frame::FrameError;

/// Everything that can go wrong while configuring, decoding or playing a sequence.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("source directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("decoder setup failed: {0}")]
    DecodeSetup(String),

    #[error("failed to decode frame {index}: {reason}")]
    FrameDecode { index: usize, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {name}: {source}")]
    Image {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Layout(#[from] FrameError),

    #[error("frame source produced no frames")]
    NoFrames,

    #[error("frame source was stopped")]
    Stopped,

    #[error("frame source thread panicked: {0}")]
    SourcePanicked(String),
}

pub type Result<T> = std::result::Result<T, SequenceError>;
