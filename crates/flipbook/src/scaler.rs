use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};

use crate::frame::{DrawTransform, FrameError, PixelBuffer, PixelFormat, RenderableFrame};

/// Resampling filter used for every resized frame.
const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// How frames whose size differs from the viewport are fitted to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Resample pixels to the viewport size on the producer thread.
    #[default]
    Resample,
    /// Keep native pixels and scale at paint time.
    DrawTransform,
}

/// Fits frames to one viewport with one mode for the whole sequence.
#[derive(Debug, Clone, Copy)]
pub struct Scaler {
    mode: ScaleMode,
    target: (u32, u32),
}

impl Scaler {
    pub fn new(mode: ScaleMode, target_width: u32, target_height: u32) -> Self {
        Self {
            mode,
            target: (target_width, target_height),
        }
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn target(&self) -> (u32, u32) {
        self.target
    }

    /// Dimensions a decoder should produce for a `native`-sized stream so that
    /// `apply` has nothing left to do in `Resample` mode.
    pub fn output_dimensions(&self, native: (u32, u32)) -> (u32, u32) {
        match self.mode {
            ScaleMode::Resample => self.target,
            ScaleMode::DrawTransform => native,
        }
    }

    pub fn apply(&self, index: usize, buffer: PixelBuffer) -> Result<RenderableFrame, FrameError> {
        let native = buffer.dimensions();
        if native == self.target {
            return Ok(RenderableFrame {
                index,
                buffer,
                transform: DrawTransform::IDENTITY,
            });
        }

        match self.mode {
            ScaleMode::Resample => Ok(RenderableFrame {
                index,
                buffer: resample(buffer, self.target)?,
                transform: DrawTransform::IDENTITY,
            }),
            ScaleMode::DrawTransform => Ok(RenderableFrame {
                index,
                transform: DrawTransform::fit(native, self.target),
                buffer,
            }),
        }
    }
}

fn resample(buffer: PixelBuffer, target: (u32, u32)) -> Result<PixelBuffer, FrameError> {
    let (w, h) = buffer.dimensions();
    let format = buffer.format();
    let expected = format.buffer_size(w, h);
    let actual = buffer.bytes().len();
    let size_err = || FrameError::SizeMismatch {
        width: w,
        height: h,
        format,
        expected,
        actual,
    };

    let img = ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, buffer.into_bytes()).ok_or_else(size_err)?;
    let bytes = imageops::resize(&img, target.0, target.1, RESAMPLE_FILTER).into_raw();
    PixelBuffer::new(target.0, target.1, format, bytes)
}
