//! End-to-end key-frame extraction from an uploaded video.

use std::path::{Path, PathBuf};

use lg_models::Frame;
use tracing::info;

use crate::decode::FfmpegFrameSource;
use crate::encode::{JpegEncoder, DEFAULT_JPEG_QUALITY};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;
use crate::segmenter::{FrameSegmenter, SegmenterConfig};

/// Settings for one extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub segmenter: SegmenterConfig,
    /// Downscale wider frames to this width before encoding
    pub max_width: Option<u32>,
    pub jpeg_quality: u8,
    /// Where uploaded bytes are spooled for FFmpeg
    pub work_dir: PathBuf,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            max_width: Some(1920),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            work_dir: std::env::temp_dir(),
        }
    }
}

/// Spool `bytes` to a temp file and extract key frames from it.
///
/// The temp file is removed when extraction returns.
pub async fn extract_key_frames_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> MediaResult<Vec<Frame>> {
    if bytes.is_empty() {
        return Err(MediaError::InvalidVideo("Empty upload".to_string()));
    }

    tokio::fs::create_dir_all(&config.work_dir).await?;
    let temp = tempfile::Builder::new()
        .prefix("walkthrough-")
        .suffix(".mp4")
        .tempfile_in(&config.work_dir)?;
    tokio::fs::write(temp.path(), bytes).await?;

    extract_key_frames(temp.path(), config).await
}

/// Extract key frames from a video file.
///
/// Probing or spawning the decoder failing is an error; the decoder running
/// out of frames is not.
pub async fn extract_key_frames(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> MediaResult<Vec<Frame>> {
    let path = path.as_ref().to_path_buf();
    let info = probe_video(&path).await?;

    info!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.fps,
        duration = info.duration,
        "Extracting key frames"
    );

    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let source = FfmpegFrameSource::spawn(&path, &info, config.max_width)?;
        let encoder = JpegEncoder::new(config.jpeg_quality);
        let frames: Vec<Frame> = FrameSegmenter::new(source, encoder, config.segmenter).collect();
        Ok(frames)
    })
    .await
    .map_err(|e| MediaError::internal(format!("Segmentation task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let config = ExtractionConfig::default();
        let result = extract_key_frames_from_bytes(&[], &config).await;
        assert!(matches!(result, Err(MediaError::InvalidVideo(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let config = ExtractionConfig::default();
        let result = extract_key_frames("/nonexistent/walkthrough.mp4", &config).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
