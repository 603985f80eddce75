//! Still frames sampled from a walkthrough video.

use std::fmt;

/// A single encoded still frame.
///
/// Frames are owned by one pipeline run and dropped once classified
/// (or, when a defect is found, once its image has been uploaded).
#[derive(Clone, PartialEq)]
pub struct Frame {
    /// Presentation time in seconds from the start of the video
    pub timestamp: f64,
    /// Encoded still image (JPEG)
    pub image: Vec<u8>,
}

impl Frame {
    pub fn new(timestamp: f64, image: Vec<u8>) -> Self {
        Self { timestamp, image }
    }
}

// Manual impl so logs never dump image bytes.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("timestamp", &self.timestamp)
            .field("image_len", &self.image.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_image_bytes() {
        let frame = Frame::new(1.5, vec![0xFF; 4096]);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("image_len: 4096"));
        assert!(rendered.contains("1.5"));
    }
}
