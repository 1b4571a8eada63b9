//! RGB frame buffers

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes in a packed RGB8 buffer of this size
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A captured RGB8 raster, row-major, no padding
///
/// Frames are immutable once captured. The session keeps the most recent one
/// behind an `Arc` so it stays readable after being handed to the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    resolution: Resolution,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an existing RGB8 buffer
    pub fn from_rgb(resolution: Resolution, data: Vec<u8>) -> Result<Self, FrameError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(FrameError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }
        let expected = resolution.rgb_len();
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { resolution, data })
    }

    /// All-black frame, used as the placeholder while the source is building
    pub fn blank(resolution: Resolution) -> Self {
        Self {
            resolution,
            data: vec![0; resolution.rgb_len()],
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// RGB triple at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        let i = (y as usize * self.resolution.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }
}
