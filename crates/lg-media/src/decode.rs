//! Sequential raw-frame decoding through FFmpeg.
//!
//! FFmpeg writes packed RGB24 frames to stdout; this module reads them one
//! at a time so a run never holds more than one decoded frame.
//!
//! The filter chain always resamples to a constant rate and scales to an
//! explicit size, so `index / fps` is the presentation time and every frame
//! has the dimensions the reader expects, even for variable-rate or rotated
//! phone footage.

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;

/// One decoded frame in packed RGB24.
#[derive(Clone)]
pub struct RawFrame {
    /// Presentation time in seconds
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes
    pub rgb: Vec<u8>,
}

impl RawFrame {
    pub fn new(timestamp: f64, width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self {
            timestamp,
            width,
            height,
            rgb,
        }
    }

    /// Expected buffer length for the frame dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("timestamp", &self.timestamp)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Output dimensions after optional downscaling to `max_width`.
///
/// Both dimensions are kept even so chroma-subsampled sources scale cleanly.
pub fn output_dimensions(width: u32, height: u32, max_width: Option<u32>) -> (u32, u32) {
    match max_width {
        Some(max) if max > 0 && width > max => {
            let target_w = (max / 2 * 2).max(2);
            let scaled_h = (height as f64 * target_w as f64 / width as f64).round() as u32;
            let target_h = (scaled_h / 2 * 2).max(2);
            (target_w, target_h)
        }
        _ => (width, height),
    }
}

/// FFmpeg output settings for one decode.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodePlan {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl DecodePlan {
    /// Output geometry for `info`: display orientation, optionally downscaled.
    pub fn for_video(info: &VideoInfo, max_width: Option<u32>) -> Self {
        let (display_w, display_h) = info.display_dimensions();
        let (width, height) = output_dimensions(display_w, display_h, max_width);
        Self {
            width,
            height,
            fps: if info.fps.is_finite() && info.fps > 0.0 { info.fps } else { 30.0 },
        }
    }

    /// `-vf` value: constant frame rate, then explicit size.
    pub fn filter(&self) -> String {
        format!("fps={},scale={}:{}", self.fps, self.width, self.height)
    }

    /// Arguments following the input file.
    pub fn output_args(&self) -> Vec<String> {
        [
            "-an",
            "-sn",
            "-vf",
            self.filter().as_str(),
            "-fps_mode",
            "cfr",
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
            "-",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect()
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Iterator over raw frames decoded by an FFmpeg child process.
///
/// Ends when FFmpeg closes stdout or a read fails mid-stream; the child is
/// killed and reaped on drop.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    plan: DecodePlan,
    index: u64,
    done: bool,
}

impl FfmpegFrameSource {
    /// Start decoding `path`.
    pub fn spawn(path: &Path, info: &VideoInfo, max_width: Option<u32>) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let plan = DecodePlan::for_video(info, max_width);

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(path)
            .args(plan.output_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        debug!(
            path = %path.display(),
            width = plan.width,
            height = plan.height,
            fps = plan.fps,
            rotation = info.rotation,
            "Spawning FFmpeg raw decoder"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None));
            }
        };

        Ok(Self {
            child,
            stdout,
            plan,
            index: 0,
            done: false,
        })
    }
}

impl Iterator for FfmpegFrameSource {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.plan.frame_len()];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {
                let timestamp = self.index as f64 / self.plan.fps;
                self.index += 1;
                Some(RawFrame::new(timestamp, self.plan.width, self.plan.height, buf))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(frames = self.index, "FFmpeg stream ended");
                self.done = true;
                None
            }
            Err(e) => {
                warn!(frames = self.index, "FFmpeg read failed, ending stream: {}", e);
                self.done = true;
                None
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
        }
        match self.child.wait() {
            Ok(status) if !status.success() && self.done && self.index == 0 => {
                warn!(exit_code = ?status.code(), "FFmpeg exited without producing frames");
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to reap FFmpeg process: {}", e),
        }
    }
}
