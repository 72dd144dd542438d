use thiserror::Error;

/// Packed pixel layouts a decoded frame can be stored in. Every source
/// converts to RGBA before pushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
        }
    }

    /// Tightly packed size of a `width` x `height` frame in this format.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer holds {actual} bytes, {width}x{height} {format:?} needs {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("stride {stride} is shorter than a {row_len}-byte row")]
    StrideTooSmall { stride: usize, row_len: usize },

    #[error("plane holds {actual} bytes, {rows} rows at stride {stride} need {needed}")]
    PlaneTooShort {
        rows: usize,
        stride: usize,
        needed: usize,
        actual: usize,
    },
}

/// A raw decoded frame: tightly packed rows, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        bytes: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = format.buffer_size(width, height);
        if bytes.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                format,
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            bytes,
        })
    }

    /// Copy a padded plane (rows `stride` bytes apart) into a packed buffer.
    pub fn from_strided(
        width: u32,
        height: u32,
        format: PixelFormat,
        plane: &[u8],
        stride: usize,
    ) -> Result<Self, FrameError> {
        let rows = StridedRows::new(plane, stride, width, height, format)?;
        let mut bytes = Vec::with_capacity(format.buffer_size(width, height));
        for row in rows.iter() {
            bytes.extend_from_slice(row);
        }
        Self::new(width, height, format, bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Bytes in one packed row.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}

/// Read-only view over a decoder-owned plane whose rows may carry alignment padding.
///
/// All stride arithmetic lives here: `row(i)` yields exactly
/// `width * bytes_per_pixel` bytes starting at `i * stride`.
#[derive(Debug, Clone, Copy)]
pub struct StridedRows<'a> {
    plane: &'a [u8],
    stride: usize,
    row_len: usize,
    height: usize,
}

impl<'a> StridedRows<'a> {
    pub fn new(
        plane: &'a [u8],
        stride: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        let row_len = width as usize * format.bytes_per_pixel();
        if stride < row_len {
            return Err(FrameError::StrideTooSmall { stride, row_len });
        }
        let height = height as usize;
        // The final row does not need its padding to be present.
        let needed = match height {
            0 => 0,
            h => (h - 1) * stride + row_len,
        };
        if plane.len() < needed {
            return Err(FrameError::PlaneTooShort {
                rows: height,
                stride,
                needed,
                actual: plane.len(),
            });
        }
        Ok(Self {
            plane,
            stride,
            row_len,
            height,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row(&self, index: usize) -> Option<&'a [u8]> {
        if index >= self.height {
            return None;
        }
        let start = index * self.stride;
        self.plane.get(start..start + self.row_len)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.height).filter_map(|i| self.row(i))
    }
}

/// Per-axis scale applied when painting a frame into the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawTransform {
    pub scale_x: f32,
    pub scale_y: f32,
}

impl DrawTransform {
    pub const IDENTITY: Self = Self {
        scale_x: 1.0,
        scale_y: 1.0,
    };

    /// Scale that maps `native` onto `target` (stretch, no letterboxing).
    pub fn fit(native: (u32, u32), target: (u32, u32)) -> Self {
        if native == target {
            return Self::IDENTITY;
        }
        Self {
            scale_x: target.0 as f32 / native.0.max(1) as f32,
            scale_y: target.1 as f32 / native.1.max(1) as f32,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for DrawTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// What travels through the frame queue: pixels plus how to draw them.
#[derive(Debug, Clone)]
pub struct RenderableFrame {
    /// Position in production order, starting at 0.
    pub index: usize,
    pub buffer: PixelBuffer,
    pub transform: DrawTransform,
}
