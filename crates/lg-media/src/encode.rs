//! Still-image encoding of decoded frames.

use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ColorType;

use crate::decode::RawFrame;
use crate::error::{MediaError, MediaResult};

/// Default JPEG quality for extracted stills.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Encodes a raw frame into a still image.
pub trait StillEncoder {
    fn encode(&self, frame: &RawFrame) -> MediaResult<Vec<u8>>;
}

/// JPEG encoder backed by the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl StillEncoder for JpegEncoder {
    fn encode(&self, frame: &RawFrame) -> MediaResult<Vec<u8>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(MediaError::encode_failed("empty frame"));
        }
        if frame.rgb.len() != frame.expected_len() {
            return Err(MediaError::encode_failed(format!(
                "buffer holds {} bytes, {}x{} RGB needs {}",
                frame.rgb.len(),
                frame.width,
                frame.height,
                frame.expected_len()
            )));
        }

        let mut out = Vec::new();
        {
            let mut encoder = ImageJpegEncoder::new_with_quality(&mut out, self.quality);
            encoder
                .encode(&frame.rgb, frame.width, frame.height, ColorType::Rgb8)
                .map_err(|e| MediaError::encode_failed(e.to_string()))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_encoder_produces_jpeg() {
        let frame = RawFrame::new(0.0, 8, 8, vec![128; 8 * 8 * 3]);
        let bytes = JpegEncoder::default().encode(&frame).unwrap();
        // SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_jpeg_encoder_rejects_short_buffer() {
        let frame = RawFrame::new(0.0, 8, 8, vec![0; 10]);
        assert!(matches!(
            JpegEncoder::default().encode(&frame),
            Err(MediaError::EncodeFailed(_))
        ));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(JpegEncoder::new(0).quality(), 1);
        assert_eq!(JpegEncoder::new(250).quality(), 100);
    }
}
