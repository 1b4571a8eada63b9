//! Frame encoding for the wire
//!
//! The codecs themselves come from the `image` crate; this module only picks
//! the format and turns a [`Frame`] into encoded bytes.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Frame;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid JPEG quality {0} (expected 1-100)")]
    InvalidQuality(u8),
}

/// Wire image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Turns captured frames into transport payloads
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError>;

    fn format(&self) -> ImageFormat;
}

/// `image`-backed encoder for JPEG or PNG
#[derive(Debug, Clone)]
pub struct ImageEncoder {
    format: ImageFormat,
    quality: u8,
}

impl ImageEncoder {
    pub fn new(format: ImageFormat, quality: u8) -> Result<Self, EncodeError> {
        if !(1..=100).contains(&quality) {
            return Err(EncodeError::InvalidQuality(quality));
        }
        Ok(Self { format, quality })
    }

    pub fn jpeg(quality: u8) -> Result<Self, EncodeError> {
        Self::new(ImageFormat::Jpeg, quality)
    }

    pub fn png() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: 100,
        }
    }
}

impl FrameEncoder for ImageEncoder {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        match self.format {
            ImageFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut buf, self.quality).encode(
                    frame.as_bytes(),
                    frame.width(),
                    frame.height(),
                    ExtendedColorType::Rgb8,
                )?;
            }
            ImageFormat::Png => {
                PngEncoder::new(&mut buf).write_image(
                    frame.as_bytes(),
                    frame.width(),
                    frame.height(),
                    ExtendedColorType::Rgb8,
                )?;
            }
        }
        Ok(buf)
    }

    fn format(&self) -> ImageFormat {
        self.format
    }
}
