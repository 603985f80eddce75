//! Frame extraction for walkthrough videos.
//!
//! This crate provides:
//! - FFprobe stream probing
//! - Sequential raw-frame decoding through FFmpeg
//! - JPEG encoding of selected stills
//! - Key-frame segmentation (cadence + scene change)
//! - Frame budget selection ahead of classification

pub mod budget;
pub mod decode;
pub mod encode;
pub mod error;
pub mod extract;
pub mod probe;
pub mod segmenter;

pub use budget::{select_frames, select_indices};
pub use decode::{DecodePlan, FfmpegFrameSource, RawFrame};
pub use encode::{JpegEncoder, StillEncoder};
pub use error::{MediaError, MediaResult};
pub use extract::{extract_key_frames, extract_key_frames_from_bytes, ExtractionConfig};
pub use probe::{probe_video, VideoInfo};
pub use segmenter::{FrameSegmenter, SegmenterConfig, SegmenterStats, Trigger};
