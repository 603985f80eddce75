//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use lg_media::{ExtractionConfig, SegmenterConfig};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum frames sent to the classifier per run
    pub frame_budget: usize,
    pub segmenter: SegmenterConfig,
    /// Frames wider than this are downscaled before encoding
    pub max_width: Option<u32>,
    pub jpeg_quality: u8,
    /// Per-call timeout for vision requests
    pub classify_timeout: Duration,
    /// Vision calls in flight at once (1 = sequential)
    pub classify_concurrency: usize,
    /// Work directory for temporary files
    pub work_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_budget: 10,
            segmenter: SegmenterConfig::default(),
            max_width: Some(1920),
            jpeg_quality: 85,
            classify_timeout: Duration::from_secs(60),
            classify_concurrency: 1,
            work_dir: PathBuf::from("/tmp/lg-worker"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Finite, non-negative seconds or thresholds only.
fn env_non_negative(name: &str) -> Option<f64> {
    env_parse::<f64>(name).filter(|v| v.is_finite() && *v >= 0.0)
}

impl PipelineConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let seg = defaults.segmenter;

        Self {
            frame_budget: env_parse("FRAME_BUDGET").unwrap_or(defaults.frame_budget),
            segmenter: SegmenterConfig {
                scene_change_threshold: env_non_negative("SCENE_CHANGE_THRESHOLD")
                    .unwrap_or(seg.scene_change_threshold),
                cadence_floor: env_non_negative("CADENCE_FLOOR_SECS").unwrap_or(seg.cadence_floor),
                min_scene_gap: env_non_negative("MIN_SCENE_GAP_SECS").unwrap_or(seg.min_scene_gap),
            },
            // 0 disables downscaling
            max_width: match env_parse::<u32>("FRAME_MAX_WIDTH") {
                Some(0) => None,
                Some(w) => Some(w),
                None => defaults.max_width,
            },
            jpeg_quality: env_parse("JPEG_QUALITY").unwrap_or(defaults.jpeg_quality),
            classify_timeout: env_parse("CLASSIFY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.classify_timeout),
            classify_concurrency: env_parse::<usize>("CLASSIFY_CONCURRENCY")
                .unwrap_or(defaults.classify_concurrency)
                .max(1),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
        }
    }

    /// Settings for the frame extraction stage.
    pub fn extraction(&self) -> ExtractionConfig {
        ExtractionConfig {
            segmenter: self.segmenter,
            max_width: self.max_width,
            jpeg_quality: self.jpeg_quality,
            work_dir: self.work_dir.clone(),
        }
    }
}
