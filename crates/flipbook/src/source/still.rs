use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Result, SequenceError};
use crate::frame::{PixelBuffer, PixelFormat};
use crate::queue::FrameSink;
use crate::scaler::Scaler;

use super::FrameProducer;

/// Where numbered frame images are read from.
pub enum ImageStore {
    /// Files in a directory on disk.
    Directory(PathBuf),
    /// Encoded images compiled into the binary, keyed by file name.
    Embedded(HashMap<String, Cow<'static, [u8]>>),
}

impl ImageStore {
    /// Build an embedded store from `include_bytes!`-style pairs.
    pub fn embedded<I>(files: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, &'static [u8])>,
    {
        ImageStore::Embedded(
            files
                .into_iter()
                .map(|(name, bytes)| (name.to_string(), Cow::Borrowed(bytes)))
                .collect(),
        )
    }

    fn load(&self, name: &str) -> Result<PixelBuffer> {
        let img = match self {
            ImageStore::Directory(dir) => {
                let path = dir.join(name);
                let bytes = std::fs::read(&path).map_err(|source| SequenceError::Io {
                    path: path.clone(),
                    source,
                })?;
                image::load_from_memory(&bytes)
            }
            ImageStore::Embedded(files) => {
                let bytes = files.get(name).ok_or_else(|| SequenceError::Io {
                    path: PathBuf::from(name),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "not present in embedded store",
                    ),
                })?;
                image::load_from_memory(bytes)
            }
        }
        .map_err(|source| SequenceError::Image {
            name: name.to_string(),
            source,
        })?;

        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        Ok(PixelBuffer::new(w, h, PixelFormat::Rgba8, rgba.into_raw())?)
    }
}

/// Number of decimal digits in `n` (`0` has one).
pub fn digit_count(n: usize) -> usize {
    match n {
        0 => 1,
        n => n.ilog10() as usize + 1,
    }
}

/// Zero-padding width for a sequence of `total_frames`: `floor(log10(total)) + 1`.
pub fn padding_width(total_frames: usize) -> usize {
    digit_count(total_frames)
}

/// How many leading zeros frame `index` gets inside a `width`-digit field.
/// Index 0 contributes its own digit, so it gets `width - 1` zeros.
pub fn leading_zeros(index: usize, width: usize) -> usize {
    width.saturating_sub(digit_count(index))
}

/// `<prefix><zeros><index>.<extension>`
pub fn frame_file_name(prefix: &str, index: usize, width: usize, extension: &str) -> String {
    format!(
        "{prefix}{}{index}.{extension}",
        "0".repeat(leading_zeros(index, width))
    )
}

/// Decodes `total_frames` numbered images in ascending order.
///
/// A missing or undecodable file ends the run with an error; there is no
/// per-frame retry.
pub struct StillImageSource {
    store: ImageStore,
    prefix: String,
    extension: String,
    total_frames: usize,
    padding: usize,
    scaler: Scaler,
}

impl StillImageSource {
    pub fn new(store: ImageStore, prefix: impl Into<String>, total_frames: usize, scaler: Scaler) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            extension: "png".into(),
            total_frames,
            padding: padding_width(total_frames),
            scaler,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn file_name(&self, index: usize) -> String {
        frame_file_name(&self.prefix, index, self.padding, &self.extension)
    }
}

impl FrameProducer for StillImageSource {
    fn name(&self) -> String {
        let location = match &self.store {
            ImageStore::Directory(dir) => dir.display().to_string(),
            ImageStore::Embedded(_) => "<embedded>".to_string(),
        };
        format!("{location}/{} x{}", self.file_name(0), self.total_frames)
    }

    fn produce(&mut self, sink: &FrameSink) -> Result<usize> {
        for index in 0..self.total_frames {
            if sink.should_stop() {
                return Err(SequenceError::Stopped);
            }
            let name = self.file_name(index);
            let buffer = self.store.load(&name)?;
            let frame = self.scaler.apply(index, buffer)?;
            sink.push(frame)?;
            log::debug!("Loaded frame {}/{} ({name})", index + 1, self.total_frames);
        }
        Ok(self.total_frames)
    }
}
