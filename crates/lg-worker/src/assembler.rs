//! Report assembly: upload defect stills and persist the condition report.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use lg_firestore::ConditionReportRepository;
use lg_models::{AssetRef, ConditionReport, DefectRecord, Detection, ReportId};
use lg_storage::R2Client;

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Asset upload failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Report write failed: {0}")]
    Write(String),

    #[error("Report read failed: {0}")]
    Read(String),
}

/// Durable storage for defect stills.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload_image(&self, bytes: Vec<u8>) -> Result<AssetRef, UploadError>;
}

/// Durable storage for condition reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Write the whole report in one atomic create.
    async fn create_report(&self, report: &ConditionReport) -> Result<ReportId, PersistError>;

    async fn fetch_report(&self, id: &ReportId) -> Result<Option<ConditionReport>, PersistError>;
}

#[async_trait]
impl AssetStore for R2Client {
    async fn upload_image(&self, bytes: Vec<u8>) -> Result<AssetRef, UploadError> {
        self.upload_image_asset(bytes)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))
    }
}

#[async_trait]
impl ReportStore for ConditionReportRepository {
    async fn create_report(&self, report: &ConditionReport) -> Result<ReportId, PersistError> {
        self.create(report)
            .await
            .map(|_| report.id.clone())
            .map_err(|e| PersistError::Write(e.to_string()))
    }

    async fn fetch_report(&self, id: &ReportId) -> Result<Option<ConditionReport>, PersistError> {
        self.get(id).await.map_err(|e| PersistError::Read(e.to_string()))
    }
}

/// Key of the `seq`-th defect record in a report (1-based).
pub fn defect_key(seq: usize) -> String {
    format!("defect-{:03}", seq)
}

/// Builds and persists condition reports.
#[derive(Clone)]
pub struct ReportAssembler {
    assets: Arc<dyn AssetStore>,
    reports: Arc<dyn ReportStore>,
}

impl ReportAssembler {
    pub fn new(assets: Arc<dyn AssetStore>, reports: Arc<dyn ReportStore>) -> Self {
        Self { assets, reports }
    }

    /// Upload each detection's still, then persist the report.
    ///
    /// A failed upload leaves that record without an asset reference. Only a
    /// failed write is an error.
    pub async fn assemble(
        &self,
        detections: Vec<Detection>,
        source_ref: Option<String>,
    ) -> WorkerResult<ReportId> {
        let report = self.build_report(detections, source_ref).await;
        self.persist(&report).await
    }

    /// Upload stills and build the report, without writing it.
    pub async fn build_report(
        &self,
        mut detections: Vec<Detection>,
        source_ref: Option<String>,
    ) -> ConditionReport {
        let uploads = detections.iter_mut().map(|detection| {
            let image = detection.take_image();
            let timestamp = detection.timestamp;
            async move {
                let bytes = image?;
                match self.assets.upload_image(bytes).await {
                    Ok(asset) => {
                        metrics::counter!("asset_uploads_total", "outcome" => "ok").increment(1);
                        Some(asset)
                    }
                    Err(e) => {
                        metrics::counter!("asset_uploads_total", "outcome" => "error").increment(1);
                        warn!(timestamp, "Screenshot upload failed, keeping defect without image: {}", e);
                        None
                    }
                }
            }
        });
        let assets: Vec<Option<AssetRef>> = join_all(uploads).await;

        let records: Vec<DefectRecord> = detections
            .iter()
            .zip(assets)
            .enumerate()
            .map(|(i, (detection, asset))| {
                DefectRecord::from_detection(defect_key(i + 1), detection, asset)
            })
            .collect();

        ConditionReport::new(source_ref, records)
    }

    /// Write a built report with one atomic create.
    pub async fn persist(&self, report: &ConditionReport) -> WorkerResult<ReportId> {
        let report_id = self
            .reports
            .create_report(report)
            .await
            .map_err(|e| WorkerError::persist_failed(e.to_string()))?;

        info!(
            report_id = %report_id,
            defects = report.defects.len(),
            with_images = report.defects_with_assets(),
            "Condition report saved"
        );
        Ok(report_id)
    }

    pub async fn fetch(&self, id: &ReportId) -> WorkerResult<Option<ConditionReport>> {
        self.reports
            .fetch_report(id)
            .await
            .map_err(|e| WorkerError::persist_failed(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stores shared by the assembler and pipeline tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the upload whose image starts with `fail_marker`.
    #[derive(Default)]
    pub struct MemoryAssets {
        pub fail_marker: Option<u8>,
        pub uploaded: AtomicUsize,
    }

    #[async_trait]
    impl AssetStore for MemoryAssets {
        async fn upload_image(&self, bytes: Vec<u8>) -> Result<AssetRef, UploadError> {
            if bytes.first().copied() == self.fail_marker && self.fail_marker.is_some() {
                return Err(UploadError::Failed("bucket unavailable".into()));
            }
            let n = self.uploaded.fetch_add(1, Ordering::SeqCst);
            Ok(AssetRef::new(format!("mem/{}.jpg", n)))
        }
    }

    #[derive(Default)]
    pub struct MemoryReports {
        pub fail_writes: bool,
        pub saved: Mutex<Vec<ConditionReport>>,
    }

    impl MemoryReports {
        pub fn saved(&self) -> Vec<ConditionReport> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReportStore for MemoryReports {
        async fn create_report(&self, report: &ConditionReport) -> Result<ReportId, PersistError> {
            if self.fail_writes {
                return Err(PersistError::Write("firestore unavailable".into()));
            }
            self.saved.lock().unwrap().push(report.clone());
            Ok(report.id.clone())
        }

        async fn fetch_report(&self, id: &ReportId) -> Result<Option<ConditionReport>, PersistError> {
            Ok(self.saved.lock().unwrap().iter().find(|r| &r.id == id).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{MemoryAssets, MemoryReports};
    use super::*;
    use lg_models::{DefectType, Severity};

    fn detection(marker: u8, timestamp: f64) -> Detection {
        Detection {
            defect_type: DefectType::Scratch,
            location: "door frame".into(),
            description: "paint scraped".into(),
            severity: Severity::Minor,
            confidence: 0.7,
            timestamp,
            image: Some(vec![marker, 0xFF, 0xD8]),
        }
    }

    fn assembler(assets: MemoryAssets, reports: Arc<MemoryReports>) -> ReportAssembler {
        ReportAssembler::new(Arc::new(assets), reports)
    }

    #[tokio::test]
    async fn test_one_failed_upload_of_three() {
        let reports = Arc::new(MemoryReports::default());
        let assets = MemoryAssets {
            fail_marker: Some(2),
            ..Default::default()
        };

        let detections = vec![detection(1, 1.0), detection(2, 2.0), detection(3, 3.0)];
        let id = assembler(assets, reports.clone())
            .assemble(detections, Some("walkthrough.mp4".into()))
            .await
            .unwrap();

        let saved = reports.saved();
        assert_eq!(saved.len(), 1);
        let report = &saved[0];
        assert_eq!(report.id, id);
        assert_eq!(report.source_ref.as_deref(), Some("walkthrough.mp4"));
        assert_eq!(report.defects.len(), 3);
        assert!(report.defects[0].asset_ref.is_some());
        assert!(report.defects[1].asset_ref.is_none());
        assert!(report.defects[2].asset_ref.is_some());

        let keys: Vec<&str> = report.defects.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["defect-001", "defect-002", "defect-003"]);
    }

    #[tokio::test]
    async fn test_no_detections_persists_empty_report() {
        let reports = Arc::new(MemoryReports::default());
        let id = assembler(MemoryAssets::default(), reports.clone())
            .assemble(Vec::new(), None)
            .await
            .unwrap();

        let saved = reports.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, id);
        assert!(saved[0].defects.is_empty());
    }

    #[tokio::test]
    async fn test_detection_without_image_skips_upload() {
        let reports = Arc::new(MemoryReports::default());
        let assets = Arc::new(MemoryAssets::default());
        let mut d = detection(1, 1.0);
        d.image = None;

        ReportAssembler::new(assets.clone(), reports.clone())
            .assemble(vec![d], None)
            .await
            .unwrap();

        assert_eq!(assets.uploaded.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(reports.saved()[0].defects[0].asset_ref.is_none());
    }

    #[tokio::test]
    async fn test_persist_failure_is_fatal() {
        let reports = Arc::new(MemoryReports {
            fail_writes: true,
            ..Default::default()
        });
        let err = assembler(MemoryAssets::default(), reports)
            .assemble(vec![detection(1, 1.0)], None)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::PersistFailed(_)));
        assert_eq!(err.user_message(), "report could not be saved");
    }

    #[tokio::test]
    async fn test_fetch_round_trip() {
        let reports = Arc::new(MemoryReports::default());
        let assembler = assembler(MemoryAssets::default(), reports);
        let id = assembler.assemble(vec![detection(1, 0.5)], None).await.unwrap();

        let fetched = assembler.fetch(&id).await.unwrap().unwrap();
        assert_eq!(fetched.defects.len(), 1);
        assert!(assembler.fetch(&ReportId::from_string("nope")).await.unwrap().is_none());
    }

    /// Tallies `asset_uploads_total` increments by outcome.
    #[derive(Default)]
    struct UploadTally {
        ok: Arc<std::sync::atomic::AtomicU64>,
        error: Arc<std::sync::atomic::AtomicU64>,
    }

    struct Tally(Arc<std::sync::atomic::AtomicU64>);

    impl metrics::CounterFn for Tally {
        fn increment(&self, value: u64) {
            self.0.fetch_add(value, std::sync::atomic::Ordering::SeqCst);
        }

        fn absolute(&self, value: u64) {
            self.0.store(value, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl metrics::Recorder for UploadTally {
        fn describe_counter(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_gauge(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_histogram(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}

        fn register_counter(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            if key.name() != "asset_uploads_total" {
                return metrics::Counter::noop();
            }
            let ok = key.labels().any(|l| l.key() == "outcome" && l.value() == "ok");
            let cell = if ok { self.ok.clone() } else { self.error.clone() };
            metrics::Counter::from_arc(Arc::new(Tally(cell)))
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::noop()
        }

        fn register_histogram(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_each_upload_counted_once() {
        let tally = UploadTally::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let assets = MemoryAssets {
            fail_marker: Some(2),
            ..Default::default()
        };
        let assembler = assembler(assets, Arc::new(MemoryReports::default()));
        let detections = vec![detection(1, 1.0), detection(2, 2.0), detection(3, 3.0)];

        let report = metrics::with_local_recorder(&tally, || {
            runtime.block_on(assembler.build_report(detections, None))
        });

        assert_eq!(report.defects_with_assets(), 2);
        assert_eq!(tally.ok.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(tally.error.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_goes_through_report_store() {
        let reports = Arc::new(MemoryReports::default());
        let report = ConditionReport::new(Some("walkthrough.mp4".into()), Vec::new());
        reports.create_report(&report).await.unwrap();

        let fetched = assembler(MemoryAssets::default(), reports)
            .fetch(&report.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.source_ref.as_deref(), Some("walkthrough.mp4"));
    }

    #[test]
    fn test_defect_key_format() {
        assert_eq!(defect_key(1), "defect-001");
        assert_eq!(defect_key(42), "defect-042");
        assert_eq!(defect_key(1234), "defect-1234");
    }
}
