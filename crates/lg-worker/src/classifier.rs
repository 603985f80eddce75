//! Defect classification of key frames.
//!
//! Each frame is sent on its own to a [`VisionModel`] with a fixed
//! inspection instruction. The reply is decoded into a [`ModelVerdict`]
//! before any field is looked at, so the object / one-element array /
//! empty array shapes the model produces are handled in one place.
//!
//! A failed or negative frame never affects the others: `classify_all`
//! logs and drops it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use lg_media::select_frames;
use lg_models::{DefectType, Detection, Frame, Severity};

/// Instruction sent with every frame.
pub const DEFECT_INSTRUCTION: &str = r#"You are inspecting a still frame from a rental unit move-in walkthrough video.
Decide whether the frame shows any VISIBLE DEFECT: scratches, cracks, stains, holes, water damage, mold or broken fixtures.

If no defect is visible, return exactly:
{"found": false}

If a defect is visible, return a single JSON object describing the most significant one:
{
  "found": true,
  "type": "scratch" | "crack" | "stain" | "hole" | "water_damage" | "mold" | "other",
  "location": "where in the room, e.g. 'wall left of the door'",
  "description": "short description",
  "severity": "minor" | "moderate" | "major",
  "confidence": 0.0-1.0
}

Return only the JSON object and nothing else."#;

/// Failure to obtain a usable answer for one frame.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("Vision request failed: {0}")]
    Transport(String),

    #[error("Vision request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Vision model returned no content")]
    EmptyResponse,

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Detection failed validation: {0}")]
    Schema(String),
}

impl ClassificationError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            Self::Transport(_) | Self::EmptyResponse => "transport_error",
            Self::Timeout(_) => "timeout",
            Self::Malformed(_) | Self::Schema(_) => "invalid_response",
        }
    }
}

/// A vision-capable model that answers a text instruction about one image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Return the model's raw text reply for `image` (JPEG bytes).
    async fn describe_image(&self, image: &[u8], prompt: &str)
        -> Result<String, ClassificationError>;
}

/// Shape of a model reply, decided before any field is read.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelVerdict {
    /// A bare JSON object
    SingleResult(serde_json::Value),
    /// A non-empty array; holds its first element
    ArrayWithResult(serde_json::Value),
    /// `[]`
    ArrayEmpty,
    /// Anything else, with the reason
    Malformed(String),
}

impl ModelVerdict {
    /// Decode raw reply text.
    pub fn decode(text: &str) -> Self {
        let body = strip_code_fences(text);
        let value: serde_json::Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return ModelVerdict::Malformed(format!("not JSON: {}", e)),
        };

        match value {
            serde_json::Value::Object(_) => ModelVerdict::SingleResult(value),
            serde_json::Value::Array(mut items) => {
                if items.is_empty() {
                    return ModelVerdict::ArrayEmpty;
                }
                let first = items.swap_remove(0);
                if first.is_object() {
                    ModelVerdict::ArrayWithResult(first)
                } else {
                    ModelVerdict::Malformed("array element is not an object".to_string())
                }
            }
            other => ModelVerdict::Malformed(format!("unexpected JSON value: {}", other)),
        }
    }
}

/// Remove a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") up to the first newline
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches("json"),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    found: Option<bool>,
    #[serde(rename = "type", default)]
    defect_type: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Fields of a positive verdict, before the frame is attached.
#[derive(Debug, Clone, PartialEq)]
struct Finding {
    defect_type: DefectType,
    location: String,
    description: String,
    severity: Severity,
    confidence: f64,
}

/// Validate a decoded object. `Ok(None)` when nothing was found.
fn validate_verdict(value: serde_json::Value) -> Result<Option<Finding>, ClassificationError> {
    let raw: RawVerdict =
        serde_json::from_value(value).map_err(|e| ClassificationError::Schema(e.to_string()))?;

    if raw.found != Some(true) {
        return Ok(None);
    }

    let severity = raw
        .severity
        .ok_or_else(|| ClassificationError::Schema("missing severity".to_string()))?
        .parse::<Severity>()
        .map_err(|e| ClassificationError::Schema(e.to_string()))?;

    let confidence = raw
        .confidence
        .filter(|c| c.is_finite())
        .ok_or_else(|| ClassificationError::Schema("missing confidence".to_string()))?
        .clamp(0.0, 1.0);

    Ok(Some(Finding {
        defect_type: raw
            .defect_type
            .as_deref()
            .map(DefectType::parse_lenient)
            .unwrap_or_default(),
        location: raw.location.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        severity,
        confidence,
    }))
}

/// Interpret raw reply text.
fn interpret(text: &str) -> Result<Option<Finding>, ClassificationError> {
    match ModelVerdict::decode(text) {
        ModelVerdict::SingleResult(v) | ModelVerdict::ArrayWithResult(v) => validate_verdict(v),
        ModelVerdict::ArrayEmpty => Ok(None),
        ModelVerdict::Malformed(reason) => Err(ClassificationError::Malformed(reason)),
    }
}

/// Classifies frames with a shared vision model.
#[derive(Clone)]
pub struct DefectClassifier {
    model: Arc<dyn VisionModel>,
    timeout: Duration,
    concurrency: usize,
}

impl DefectClassifier {
    pub fn new(model: Arc<dyn VisionModel>, timeout: Duration) -> Self {
        Self {
            model,
            timeout,
            concurrency: 1,
        }
    }

    /// Allow up to `n` vision calls in flight (`1` = sequential).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Classify one frame. The frame's image moves into the detection.
    pub async fn classify(&self, frame: Frame) -> Result<Option<Detection>, ClassificationError> {
        let reply = tokio::time::timeout(
            self.timeout,
            self.model.describe_image(&frame.image, DEFECT_INSTRUCTION),
        )
        .await
        .map_err(|_| ClassificationError::Timeout(self.timeout))??;

        if reply.trim().is_empty() {
            return Err(ClassificationError::EmptyResponse);
        }

        Ok(interpret(&reply)?.map(|finding| Detection {
            defect_type: finding.defect_type,
            location: finding.location,
            description: finding.description,
            severity: finding.severity,
            confidence: finding.confidence,
            timestamp: frame.timestamp,
            image: Some(frame.image),
        }))
    }

    /// Budget-select `frames`, classify each and keep the detections,
    /// ordered by timestamp.
    pub async fn classify_all(&self, frames: Vec<Frame>, budget: usize) -> Vec<Detection> {
        let candidates = frames.len();
        let selected = select_frames(frames, budget);
        info!(
            candidates,
            selected = selected.len(),
            concurrency = self.concurrency,
            "Classifying frames"
        );

        let outcomes: Vec<(f64, Result<Option<Detection>, ClassificationError>)> =
            stream::iter(selected)
                .map(|frame| async move {
                    let timestamp = frame.timestamp;
                    (timestamp, self.classify(frame).await)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut detections = Vec::new();
        for (timestamp, outcome) in outcomes {
            match outcome {
                Ok(Some(detection)) => {
                    metrics::counter!("classifier_outcomes_total", "outcome" => "detected")
                        .increment(1);
                    debug!(
                        timestamp,
                        defect_type = %detection.defect_type,
                        severity = %detection.severity,
                        "Defect detected"
                    );
                    detections.push(detection);
                }
                Ok(None) => {
                    metrics::counter!("classifier_outcomes_total", "outcome" => "none").increment(1);
                }
                Err(e) => {
                    metrics::counter!("classifier_outcomes_total", "outcome" => e.outcome_label())
                        .increment(1);
                    warn!(timestamp, "Frame classification failed, skipping: {}", e);
                }
            }
        }

        detections.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STAIN: &str = r#"{"found": true, "type": "stain", "location": "carpet", "description": "wine stain", "severity": "moderate", "confidence": 0.9}"#;
    const NOTHING: &str = r#"{"found": false}"#;

    /// Replies keyed by the first image byte; unknown images fail.
    struct StubModel {
        replies: HashMap<u8, &'static str>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StubModel {
        fn new(replies: impl IntoIterator<Item = (u8, &'static str)>) -> Self {
            Self {
                replies: replies.into_iter().collect(),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VisionModel for StubModel {
        async fn describe_image(
            &self,
            image: &[u8],
            _prompt: &str,
        ) -> Result<String, ClassificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            image
                .first()
                .and_then(|b| self.replies.get(b))
                .map(|s| s.to_string())
                .ok_or_else(|| ClassificationError::transport("503 from upstream"))
        }
    }

    fn frame(id: u8, timestamp: f64) -> Frame {
        Frame::new(timestamp, vec![id, 0xD8, 0xFF])
    }

    fn classifier(model: StubModel) -> (DefectClassifier, Arc<StubModel>) {
        let model = Arc::new(model);
        (
            DefectClassifier::new(model.clone(), Duration::from_secs(5)),
            model,
        )
    }

    #[test]
    fn test_decode_shapes() {
        assert!(matches!(ModelVerdict::decode(STAIN), ModelVerdict::SingleResult(_)));
        assert!(matches!(
            ModelVerdict::decode(&format!("[{}]", STAIN)),
            ModelVerdict::ArrayWithResult(_)
        ));
        assert_eq!(ModelVerdict::decode("[]"), ModelVerdict::ArrayEmpty);
        assert!(matches!(ModelVerdict::decode("no defects here"), ModelVerdict::Malformed(_)));
        assert!(matches!(ModelVerdict::decode("[1, 2]"), ModelVerdict::Malformed(_)));
        assert!(matches!(ModelVerdict::decode("true"), ModelVerdict::Malformed(_)));
    }

    #[test]
    fn test_decode_strips_code_fences() {
        let fenced = format!("```json\n{}\n```", NOTHING);
        assert_eq!(
            ModelVerdict::decode(&fenced),
            ModelVerdict::SingleResult(serde_json::json!({"found": false}))
        );
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_interpret_validation() {
        assert!(interpret(NOTHING).unwrap().is_none());
        assert!(interpret("[]").unwrap().is_none());
        assert!(interpret(r#"{"type": "crack"}"#).unwrap().is_none());

        let missing_severity = r#"{"found": true, "type": "crack", "confidence": 0.5}"#;
        assert!(matches!(interpret(missing_severity), Err(ClassificationError::Schema(_))));

        let missing_confidence = r#"{"found": true, "type": "crack", "severity": "minor"}"#;
        assert!(matches!(interpret(missing_confidence), Err(ClassificationError::Schema(_))));

        let bad_severity = r#"{"found": true, "severity": "catastrophic", "confidence": 0.5}"#;
        assert!(matches!(interpret(bad_severity), Err(ClassificationError::Schema(_))));
    }

    #[test]
    fn test_interpret_is_lenient_where_safe() {
        let reply = r#"[{"found": true, "type": "dstain", "severity": "Major", "confidence": 1.7}]"#;
        let finding = interpret(reply).unwrap().unwrap();
        assert_eq!(finding.defect_type, DefectType::Stain);
        assert_eq!(finding.severity, Severity::Major);
        assert_eq!(finding.confidence, 1.0);
        assert_eq!(finding.location, "");
        assert_eq!(finding.description, "");

        let unknown = r#"{"found": true, "type": "graffiti", "severity": "minor", "confidence": 0.3}"#;
        assert_eq!(interpret(unknown).unwrap().unwrap().defect_type, DefectType::Other);
    }

    #[tokio::test]
    async fn test_classify_attaches_frame() {
        let (classifier, _) = classifier(StubModel::new([(1, STAIN)]));
        let detection = classifier.classify(frame(1, 4.25)).await.unwrap().unwrap();

        assert_eq!(detection.timestamp, 4.25);
        assert_eq!(detection.defect_type, DefectType::Stain);
        assert_eq!(detection.location, "carpet");
        assert_eq!(detection.image.as_deref(), Some(&[1u8, 0xD8, 0xFF][..]));
    }

    #[tokio::test]
    async fn test_classify_timeout() {
        let mut model = StubModel::new([(1, STAIN)]);
        model.delay = Some(Duration::from_secs(2));
        let classifier = DefectClassifier::new(Arc::new(model), Duration::from_millis(20));

        let err = classifier.classify(frame(1, 0.0)).await.unwrap_err();
        assert!(matches!(err, ClassificationError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_classify_empty_reply() {
        let (classifier, _) = classifier(StubModel::new([(1, "  ")]));
        let err = classifier.classify(frame(1, 0.0)).await.unwrap_err();
        assert!(matches!(err, ClassificationError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_one_failing_frame_of_five() {
        // Frame 3 has no stubbed reply, so its call fails
        let model = StubModel::new([(1, STAIN), (2, STAIN), (4, STAIN), (5, STAIN)]);
        let frames: Vec<Frame> = (1..=5).map(|i| frame(i, i as f64)).collect();

        for concurrency in [1, 3] {
            let (classifier, _) = classifier(StubModel::new(model.replies.clone()));
            let detections = classifier
                .with_concurrency(concurrency)
                .classify_all(frames.clone(), 10)
                .await;

            let timestamps: Vec<f64> = detections.iter().map(|d| d.timestamp).collect();
            assert_eq!(timestamps, vec![1.0, 2.0, 4.0, 5.0], "concurrency={}", concurrency);
        }
    }

    #[tokio::test]
    async fn test_all_negative_is_empty() {
        let (classifier, model) = classifier(StubModel::new((0..4).map(|i| (i, NOTHING))));
        let frames: Vec<Frame> = (0..4).map(|i| frame(i, i as f64)).collect();

        assert!(classifier.classify_all(frames, 10).await.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_budget_limits_calls() {
        let (classifier, model) = classifier(StubModel::new((0..10).map(|i| (i, STAIN))));
        let frames: Vec<Frame> = (0..10).map(|i| frame(i, i as f64)).collect();

        let detections = classifier.classify_all(frames, 5).await;
        assert_eq!(model.calls.load(Ordering::SeqCst), 5);
        let timestamps: Vec<f64> = detections.iter().map(|d| d.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }
}
