//! Frame codec boundary
//!
//! The transport only moves opaque payloads; turning them into pixels (and
//! back, on the edge side) goes through these traits.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

/// Default JPEG quality (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("empty payload")]
    Empty,

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Turns a wire payload into a raster image
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<DynamicImage, CodecError>;
}

/// Turns a raster image into a wire payload
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, image: &DynamicImage) -> Result<Bytes, CodecError>;
}

/// Baseline JPEG codec backed by the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameDecoder for JpegCodec {
    fn decode(&self, payload: &[u8]) -> Result<DynamicImage, CodecError> {
        if payload.is_empty() {
            return Err(CodecError::Empty);
        }
        Ok(image::load_from_memory_with_format(
            payload,
            ImageFormat::Jpeg,
        )?)
    }
}

impl FrameEncoder for JpegCodec {
    fn encode(&self, image: &DynamicImage) -> Result<Bytes, CodecError> {
        let mut buf = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
            match image {
                DynamicImage::ImageLuma8(gray) => encoder.encode_image(gray)?,
                other => encoder.encode_image(&other.to_rgb8())?,
            }
        }
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_jpeg_roundtrip_keeps_dimensions() {
        let gray = GrayImage::from_fn(64, 48, |x, y| Luma([((x * 4 + y) % 256) as u8]));
        let codec = JpegCodec::default();

        let payload = codec.encode(&DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(&payload[..2], &[0xFF, 0xD8], "missing SOI marker");

        let decoded = codec.decode(&payload).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn test_empty_payload_fails() {
        let err = JpegCodec::default().decode(&[]).unwrap_err();
        assert!(matches!(err, CodecError::Empty));
    }

    #[test]
    fn test_garbage_payload_fails() {
        let err = JpegCodec::default().decode(b"definitely not a jpeg").unwrap_err();
        assert!(matches!(err, CodecError::Image(_)));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegCodec::new(0).quality(), 1);
        assert_eq!(JpegCodec::new(200).quality(), 100);
    }
}
