//! One inspection run: video bytes in, persisted condition report out.

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use lg_media::{extract_key_frames_from_bytes, select_indices};
use lg_models::{DefectType, Detection, Frame, ReportId, RunState, Severity};

use crate::assembler::ReportAssembler;
use crate::classifier::DefectClassifier;
use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;

/// A detection as reported back to the caller, without image bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSummary {
    #[serde(rename = "type")]
    pub defect_type: DefectType,
    pub location: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f64,
    pub timestamp: f64,
}

impl From<&Detection> for DetectionSummary {
    fn from(d: &Detection) -> Self {
        Self {
            defect_type: d.defect_type,
            location: d.location.clone(),
            description: d.description.clone(),
            severity: d.severity,
            confidence: d.confidence,
            timestamp: d.timestamp,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report_id: ReportId,
    pub frames_extracted: usize,
    pub frames_classified: usize,
    pub detections: Vec<DetectionSummary>,
}

/// JSON body returned to whoever submitted the video.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse<'a> {
    pub status: &'static str,
    pub report_id: &'a str,
    pub defects_found: usize,
    pub defects: &'a [DetectionSummary],
}

impl RunSummary {
    pub fn response(&self) -> RunResponse<'_> {
        RunResponse {
            status: "success",
            report_id: self.report_id.as_str(),
            defects_found: self.detections.len(),
            defects: &self.detections,
        }
    }
}

/// Tracks and logs the run lifecycle.
struct RunTracker {
    state: RunState,
    logger: RunLogger,
}

impl RunTracker {
    fn new(logger: RunLogger) -> Self {
        Self {
            state: RunState::Ingested,
            logger,
        }
    }

    fn advance(&mut self, next: RunState, message: &str) {
        if !self.state.can_transition_to(next) {
            self.logger.log_warning(&format!(
                "unexpected transition {} -> {}",
                self.state, next
            ));
        }
        self.state = next;
        self.logger.log_state(next, message);
    }

    fn fail(&mut self, err: WorkerError) -> WorkerError {
        self.advance(RunState::Failed, &err.to_string());
        err
    }
}

/// Segment, classify, assemble and persist one walkthrough video.
#[derive(Clone)]
pub struct InspectionPipeline {
    config: PipelineConfig,
    classifier: DefectClassifier,
    assembler: ReportAssembler,
}

impl InspectionPipeline {
    pub fn new(
        config: PipelineConfig,
        classifier: DefectClassifier,
        assembler: ReportAssembler,
    ) -> Self {
        Self {
            config,
            classifier,
            assembler,
        }
    }

    /// Run the whole pipeline on an uploaded video.
    pub async fn run(
        &self,
        video_bytes: &[u8],
        source_ref: Option<String>,
    ) -> WorkerResult<RunSummary> {
        let logger = RunLogger::new(Uuid::new_v4().to_string(), "inspection");
        let span = logger.create_span();

        async move {
            let mut tracker = RunTracker::new(logger);
            tracker.logger.log_start(&format!("{} bytes", video_bytes.len()));

            let frames = match extract_key_frames_from_bytes(video_bytes, &self.config.extraction()).await {
                Ok(frames) if frames.is_empty() => {
                    return Err(tracker.fail(WorkerError::decode_failed("no decodable frames")));
                }
                Ok(frames) => frames,
                Err(e) => return Err(tracker.fail(WorkerError::decode_failed(e.to_string()))),
            };

            self.process(&mut tracker, frames, source_ref).await
        }
        .instrument(span)
        .await
    }

    /// Classify and persist frames that were already extracted.
    pub async fn run_frames(
        &self,
        frames: Vec<Frame>,
        source_ref: Option<String>,
    ) -> WorkerResult<RunSummary> {
        let logger = RunLogger::new(Uuid::new_v4().to_string(), "inspection_frames");
        let span = logger.create_span();

        async move {
            let mut tracker = RunTracker::new(logger);
            tracker.logger.log_start(&format!("{} frames", frames.len()));
            self.process(&mut tracker, frames, source_ref).await
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        tracker: &mut RunTracker,
        frames: Vec<Frame>,
        source_ref: Option<String>,
    ) -> WorkerResult<RunSummary> {
        let frames_extracted = frames.len();
        tracker.advance(
            RunState::Segmented,
            &format!("{} key frames extracted", frames_extracted),
        );

        let frames_classified = select_indices(frames_extracted, self.config.frame_budget).len();
        let detections = self
            .classifier
            .classify_all(frames, self.config.frame_budget)
            .await;
        tracker.advance(
            RunState::Classified,
            &format!(
                "{} defects in {} classified frames",
                detections.len(),
                frames_classified
            ),
        );

        let summaries: Vec<DetectionSummary> = detections.iter().map(DetectionSummary::from).collect();

        let report = self.assembler.build_report(detections, source_ref).await;
        tracker.advance(
            RunState::Assembled,
            &format!(
                "{} records, {} with images",
                report.defects.len(),
                report.defects_with_assets()
            ),
        );

        let report_id = match self.assembler.persist(&report).await {
            Ok(id) => id,
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(RunState::Persisted, &format!("report {}", report_id));
        tracker
            .logger
            .log_completion(&format!("{} defects found", summaries.len()));

        Ok(RunSummary {
            report_id,
            frames_extracted,
            frames_classified,
            detections: summaries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::assembler::testing::{MemoryAssets, MemoryReports};
    use crate::classifier::{ClassificationError, VisionModel};

    /// Defect on every frame whose first byte is listed, nothing elsewhere.
    struct MarkedFrames(HashMap<u8, &'static str>);

    #[async_trait]
    impl VisionModel for MarkedFrames {
        async fn describe_image(
            &self,
            image: &[u8],
            _prompt: &str,
        ) -> Result<String, ClassificationError> {
            let reply = image
                .first()
                .and_then(|b| self.0.get(b))
                .copied()
                .unwrap_or(r#"{"found": false}"#);
            Ok(reply.to_string())
        }
    }

    const HOLE: &str = r#"{"found": true, "type": "hole", "location": "drywall", "description": "fist-sized hole", "severity": "major", "confidence": 0.95}"#;

    fn pipeline(
        model: MarkedFrames,
        reports: Arc<MemoryReports>,
        budget: usize,
    ) -> InspectionPipeline {
        let config = PipelineConfig {
            frame_budget: budget,
            ..PipelineConfig::default()
        };
        let classifier = DefectClassifier::new(Arc::new(model), Duration::from_secs(5));
        let assembler = ReportAssembler::new(Arc::new(MemoryAssets::default()), reports);
        InspectionPipeline::new(config, classifier, assembler)
    }

    fn frames(n: u8) -> Vec<Frame> {
        (0..n).map(|i| Frame::new(i as f64, vec![i, 0xFF])).collect()
    }

    #[tokio::test]
    async fn test_run_frames_persists_detections() {
        let reports = Arc::new(MemoryReports::default());
        let model = MarkedFrames(HashMap::from([(2, HOLE), (6, HOLE)]));

        let summary = pipeline(model, reports.clone(), 10)
            .run_frames(frames(8), Some("unit-12.mp4".into()))
            .await
            .unwrap();

        assert_eq!(summary.frames_extracted, 8);
        assert_eq!(summary.frames_classified, 8);
        assert_eq!(summary.detections.len(), 2);
        assert_eq!(summary.detections[0].timestamp, 2.0);
        assert_eq!(summary.detections[1].timestamp, 6.0);

        let saved = reports.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, summary.report_id);
        assert_eq!(saved[0].defects_with_assets(), 2);
    }

    #[tokio::test]
    async fn test_budget_caps_classified_frames() {
        let reports = Arc::new(MemoryReports::default());
        // Frame 3 is not on the stride-2 grid, so it is never classified
        let model = MarkedFrames(HashMap::from([(3, HOLE), (4, HOLE)]));

        let summary = pipeline(model, reports, 5)
            .run_frames(frames(10), None)
            .await
            .unwrap();

        assert_eq!(summary.frames_classified, 5);
        assert_eq!(summary.detections.len(), 1);
        assert_eq!(summary.detections[0].timestamp, 4.0);
    }

    #[tokio::test]
    async fn test_clean_walkthrough_saves_empty_report() {
        let reports = Arc::new(MemoryReports::default());
        let summary = pipeline(MarkedFrames(HashMap::new()), reports.clone(), 10)
            .run_frames(frames(4), None)
            .await
            .unwrap();

        assert!(summary.detections.is_empty());
        assert!(reports.saved()[0].defects.is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces() {
        let reports = Arc::new(MemoryReports {
            fail_writes: true,
            ..Default::default()
        });
        let err = pipeline(MarkedFrames(HashMap::new()), reports, 10)
            .run_frames(frames(2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::PersistFailed(_)));
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_decode_failure() {
        let reports = Arc::new(MemoryReports::default());
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(MarkedFrames(HashMap::new()), reports.clone(), 10);
        p.config.work_dir = dir.path().to_path_buf();

        let err = p.run(&[], None).await.unwrap_err();
        assert!(matches!(err, WorkerError::DecodeFailed(_)));
        assert_eq!(err.user_message(), "cannot process video");
        assert!(reports.saved().is_empty());
    }

    #[test]
    fn test_response_shape() {
        let summary = RunSummary {
            report_id: ReportId::from_string("r-1"),
            frames_extracted: 3,
            frames_classified: 3,
            detections: vec![DetectionSummary {
                defect_type: DefectType::WaterDamage,
                location: "ceiling".into(),
                description: "brown ring".into(),
                severity: Severity::Moderate,
                confidence: 0.8,
                timestamp: 1.5,
            }],
        };

        let json = serde_json::to_value(summary.response()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["reportId"], "r-1");
        assert_eq!(json["defectsFound"], 1);
        assert_eq!(json["defects"][0]["type"], "water_damage");
        assert_eq!(json["defects"][0]["severity"], "moderate");
        assert!(json["defects"][0].get("image").is_none());
    }
}
