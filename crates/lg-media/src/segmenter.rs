//! Key-frame segmentation for walkthrough videos.
//!
//! Picks still frames out of a decoded stream using two triggers:
//!
//! - **Scene change**: the mean absolute grayscale difference against the
//!   previous decoded frame exceeds `scene_change_threshold` (0-255 scale)
//!   and more than `min_scene_gap` seconds have passed since the last
//!   emitted frame.
//! - **Cadence**: at least `cadence_floor` seconds have passed since the
//!   last emitted frame, so a static shot is still sampled at a floor rate.
//!
//! Both triggers are evaluated on every decoded frame, not only at codec
//! keyframes. A frame that fails to encode is skipped and the scan goes on.
//!
//! # Usage
//! ```rust,ignore
//! use lg_media::segmenter::{FrameSegmenter, SegmenterConfig};
//! use lg_media::encode::JpegEncoder;
//!
//! let frames: Vec<_> =
//!     FrameSegmenter::new(source, JpegEncoder::default(), SegmenterConfig::default()).collect();
//! ```

use lg_models::Frame;
use metrics::counter;
use tracing::{debug, info};

use crate::decode::RawFrame;
use crate::encode::StillEncoder;

/// Configuration for key-frame segmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    /// Mean absolute grayscale difference (0-255) that counts as a scene change
    pub scene_change_threshold: f64,
    /// Maximum time between emitted frames (seconds)
    pub cadence_floor: f64,
    /// Minimum time since the last emission before a scene change may emit (seconds)
    pub min_scene_gap: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            scene_change_threshold: 30.0,
            cadence_floor: 1.0,
            min_scene_gap: 0.5,
        }
    }
}

/// Why a frame was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Cadence,
    SceneChange,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Cadence => "cadence",
            Trigger::SceneChange => "scene_change",
        }
    }
}

/// Counters for one segmentation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmenterStats {
    pub frames_decoded: u64,
    pub emitted_by_cadence: u64,
    pub emitted_by_scene_change: u64,
    pub encode_failures: u64,
    pub out_of_order: u64,
}

impl SegmenterStats {
    pub fn emitted(&self) -> u64 {
        self.emitted_by_cadence + self.emitted_by_scene_change
    }
}

/// Grayscale copy of the previous decoded frame.
struct LumaFrame {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

/// Streaming key-frame selector.
///
/// Yields encoded [`Frame`]s in strictly increasing timestamp order. The
/// iterator is single-pass: once the source is exhausted it stays exhausted.
pub struct FrameSegmenter<S, E> {
    source: S,
    encoder: E,
    config: SegmenterConfig,
    previous: Option<LumaFrame>,
    last_decoded: Option<f64>,
    last_emit: Option<f64>,
    stats: SegmenterStats,
    finished: bool,
}

impl<S, E> FrameSegmenter<S, E>
where
    S: Iterator<Item = RawFrame>,
    E: StillEncoder,
{
    pub fn new(source: S, encoder: E, config: SegmenterConfig) -> Self {
        Self {
            source,
            encoder,
            config,
            previous: None,
            last_decoded: None,
            last_emit: None,
            stats: SegmenterStats::default(),
            finished: false,
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> SegmenterStats {
        self.stats
    }

    /// Decide whether a frame at `timestamp` with the given difference fires.
    fn evaluate(&self, timestamp: f64, difference: Option<f64>) -> Option<Trigger> {
        let since_last = self.last_emit.map(|last| timestamp - last);

        let scene_change = difference.is_some_and(|d| d > self.config.scene_change_threshold)
            && since_last.map_or(true, |gap| gap > self.config.min_scene_gap);
        if scene_change {
            return Some(Trigger::SceneChange);
        }

        let cadence = since_last.map_or(true, |gap| gap >= self.config.cadence_floor);
        cadence.then_some(Trigger::Cadence)
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        info!(
            frames_decoded = self.stats.frames_decoded,
            emitted = self.stats.emitted(),
            by_cadence = self.stats.emitted_by_cadence,
            by_scene_change = self.stats.emitted_by_scene_change,
            encode_failures = self.stats.encode_failures,
            "Frame segmentation finished"
        );
    }
}

impl<S, E> Iterator for FrameSegmenter<S, E>
where
    S: Iterator<Item = RawFrame>,
    E: StillEncoder,
{
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }

        while let Some(raw) = self.source.next() {
            self.stats.frames_decoded += 1;

            if self.last_decoded.is_some_and(|prev| raw.timestamp <= prev) {
                self.stats.out_of_order += 1;
                debug!(timestamp = raw.timestamp, "Dropping non-increasing frame timestamp");
                continue;
            }
            self.last_decoded = Some(raw.timestamp);

            let luma = to_grayscale(&raw.rgb);
            let difference = match &self.previous {
                Some(prev) if prev.width == raw.width && prev.height == raw.height => {
                    Some(mean_abs_diff(&prev.luma, &luma))
                }
                _ => None,
            };
            self.previous = Some(LumaFrame {
                width: raw.width,
                height: raw.height,
                luma,
            });

            let Some(trigger) = self.evaluate(raw.timestamp, difference) else {
                continue;
            };

            match self.encoder.encode(&raw) {
                Ok(image) => {
                    self.last_emit = Some(raw.timestamp);
                    match trigger {
                        Trigger::Cadence => self.stats.emitted_by_cadence += 1,
                        Trigger::SceneChange => self.stats.emitted_by_scene_change += 1,
                    }
                    counter!("segmenter_frames_emitted_total", "trigger" => trigger.as_str())
                        .increment(1);
                    debug!(
                        timestamp = raw.timestamp,
                        trigger = trigger.as_str(),
                        difference = ?difference,
                        "Key frame emitted"
                    );
                    return Some(Frame::new(raw.timestamp, image));
                }
                Err(e) => {
                    self.stats.encode_failures += 1;
                    counter!("segmenter_encode_failures_total").increment(1);
                    debug!(timestamp = raw.timestamp, "Skipping frame that failed to encode: {}", e);
                }
            }
        }

        self.finish();
        None
    }
}

/// BT.601 luma of a packed RGB24 buffer.
pub fn to_grayscale(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|px| {
            let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            y.round().min(255.0) as u8
        })
        .collect()
}

/// Mean absolute difference of two equally sized grayscale buffers.
pub fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let total: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    total as f64 / len as f64
}
