use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SequenceError};
use crate::queue::DEFAULT_CAPACITY;
use crate::scaler::{ScaleMode, Scaler};
use crate::sequence::{PlaybackSequence, StallPolicy};
use crate::source::FrameSource;
use crate::source::still::{ImageStore, StillImageSource};

/// Where a sequence's frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Numbered stills: `<location>/<prefix><padded index>.<extension>`.
    Images {
        location: PathBuf,
        prefix: String,
        total_frames: usize,
        #[serde(default = "default_extension")]
        extension: String,
    },
    /// First video stream of a container file.
    Video { path: PathBuf },
}

fn default_extension() -> String {
    "png".into()
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_source_frame_rate() -> u32 {
    30
}

fn default_tick_rate() -> u32 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub source: SourceConfig,
    pub target_width: u32,
    pub target_height: u32,
    #[serde(default = "default_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub scale_mode: ScaleMode,
    #[serde(default)]
    pub stall_policy: StallPolicy,
    /// Used for stills; video takes its rate from the stream.
    #[serde(default = "default_source_frame_rate")]
    pub source_frame_rate: u32,
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
}

impl SequenceConfig {
    pub fn images(
        location: impl Into<PathBuf>,
        prefix: impl Into<String>,
        total_frames: usize,
        target: (u32, u32),
    ) -> Self {
        Self {
            source: SourceConfig::Images {
                location: location.into(),
                prefix: prefix.into(),
                total_frames,
                extension: default_extension(),
            },
            target_width: target.0,
            target_height: target.1,
            queue_capacity: DEFAULT_CAPACITY,
            scale_mode: ScaleMode::default(),
            stall_policy: StallPolicy::default(),
            source_frame_rate: default_source_frame_rate(),
            tick_rate: default_tick_rate(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| SequenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json)
            .map_err(|e| SequenceError::Config(format!("{}: {e}", path.display())))
    }

    /// Per-user default: `<config dir>/flipbook/sequence.json`.
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flipbook").join("sequence.json"))
    }

    /// Load the per-user config if one exists.
    pub fn load_user() -> Option<Result<Self>> {
        let path = Self::user_path()?;
        if !path.exists() {
            return None;
        }
        Some(Self::from_file(&path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(SequenceError::Config(format!(
                "target size must be positive, got {}x{}",
                self.target_width, self.target_height
            )));
        }
        if self.queue_capacity == 0 {
            return Err(SequenceError::Config("queue_capacity must be positive".into()));
        }
        if self.source_frame_rate == 0 || self.tick_rate == 0 {
            return Err(SequenceError::Config("frame and tick rates must be positive".into()));
        }

        match &self.source {
            SourceConfig::Images {
                location,
                total_frames,
                ..
            } => {
                if *total_frames == 0 {
                    return Err(SequenceError::Config("total_frames must be positive".into()));
                }
                if !location.is_dir() {
                    return Err(SequenceError::MissingDirectory(location.clone()));
                }
            }
            SourceConfig::Video { path } => {
                if !cfg!(feature = "video") {
                    return Err(SequenceError::Config(format!(
                        "{} is a video source but flipbook was built without the `video` feature",
                        path.display()
                    )));
                }
                if !path.is_file() {
                    return Err(SequenceError::Io {
                        path: path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn scaler(&self) -> Scaler {
        Scaler::new(self.scale_mode, self.target_width, self.target_height)
    }
}

/// Validate `config`, spawn its frame source and wait for the first frame.
pub fn open_sequence(config: &SequenceConfig) -> Result<PlaybackSequence> {
    config.validate()?;
    let scaler = config.scaler();

    match &config.source {
        SourceConfig::Images {
            location,
            prefix,
            total_frames,
            extension,
        } => {
            let producer = StillImageSource::new(
                ImageStore::Directory(location.clone()),
                prefix.clone(),
                *total_frames,
                scaler,
            )
            .with_extension(extension.clone());
            let source = FrameSource::spawn(producer, config.queue_capacity)?;
            PlaybackSequence::start(
                source,
                *total_frames,
                config.source_frame_rate,
                config.stall_policy,
            )
        }
        #[cfg(feature = "video")]
        SourceConfig::Video { path } => {
            use crate::source::video::{VideoSource, probe};

            let info = probe(path)?;
            let source = FrameSource::spawn(VideoSource::new(path.clone(), scaler), config.queue_capacity)?;
            PlaybackSequence::start_until_close(
                source,
                info.frame_count,
                info.clock_rate(),
                config.stall_policy,
            )
        }
        #[cfg(not(feature = "video"))]
        SourceConfig::Video { path } => Err(SequenceError::Config(format!(
            "{} needs the `video` feature",
            path.display()
        ))),
    }
}
