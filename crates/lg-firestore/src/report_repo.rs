//! Repository for condition report documents.
//!
//! One document per report at `condition_reports/{report_id}`, with the
//! defect records embedded as an array of maps. A report is written once
//! with a single create and never updated.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use tracing::{info, warn};

use lg_models::{AssetRef, ConditionReport, DefectRecord, DefectType, ReportId, Severity};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

pub const REPORTS_COLLECTION: &str = "condition_reports";

pub struct ConditionReportRepository {
    client: FirestoreClient,
}

impl ConditionReportRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Persist a report under its id with one atomic create.
    ///
    /// The id is allocated by the caller, so a conflict on a retried attempt
    /// means an earlier attempt committed and only its response was lost.
    /// A conflict on the first attempt is still an error.
    pub async fn create(&self, report: &ConditionReport) -> FirestoreResult<()> {
        let fields = report_to_fields(report);
        let attempts = AtomicU32::new(0);
        self.client
            .with_retry("create_report", || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                let fields = fields.clone();
                async move {
                    match self
                        .client
                        .create_document(REPORTS_COLLECTION, report.id.as_str(), fields)
                        .await
                    {
                        Ok(_) => Ok(()),
                        Err(FirestoreError::AlreadyExists(path)) if attempt > 0 => {
                            warn!(
                                report_id = %report.id,
                                attempt,
                                "Report already stored by an earlier attempt: {}", path
                            );
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            })
            .await?;

        info!(
            report_id = %report.id,
            defects = report.defects.len(),
            "Created condition report"
        );
        Ok(())
    }

    /// Fetch a report by id.
    pub async fn get(&self, report_id: &ReportId) -> FirestoreResult<Option<ConditionReport>> {
        let doc = self
            .client
            .with_retry("get_report", || {
                self.client.get_document(REPORTS_COLLECTION, report_id.as_str())
            })
            .await?;

        doc.map(|d| document_to_report(&d, report_id)).transpose()
    }
}

fn defect_to_value(defect: &DefectRecord) -> Value {
    let mut fields = HashMap::new();
    fields.insert("key".to_string(), defect.key.to_firestore_value());
    fields.insert("type".to_string(), defect.defect_type.as_str().to_firestore_value());
    fields.insert("location".to_string(), defect.location.to_firestore_value());
    fields.insert("description".to_string(), defect.description.to_firestore_value());
    fields.insert("severity".to_string(), defect.severity.as_str().to_firestore_value());
    fields.insert("timestamp".to_string(), defect.timestamp.to_firestore_value());
    fields.insert("confidence".to_string(), defect.confidence.to_firestore_value());
    fields.insert(
        "asset_ref".to_string(),
        defect.asset_ref.as_ref().map(|a| a.as_str()).to_firestore_value(),
    );
    Value::map(fields)
}

fn report_to_fields(report: &ConditionReport) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("report_id".to_string(), report.id.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), report.created_at.to_firestore_value());
    fields.insert("source_ref".to_string(), report.source_ref.to_firestore_value());
    fields.insert("defect_count".to_string(), (report.defects.len() as u32).to_firestore_value());
    fields.insert(
        "defects".to_string(),
        Value::array(report.defects.iter().map(defect_to_value).collect()),
    );
    fields
}

fn value_to_defect(value: &Value, index: usize) -> FirestoreResult<DefectRecord> {
    let fields = value.as_map().ok_or_else(|| {
        FirestoreError::InvalidResponse(format!("defects[{}] is not a map", index))
    })?;

    let get_string = |key: &str| -> String {
        fields
            .get(key)
            .and_then(String::from_firestore_value)
            .unwrap_or_default()
    };
    let get_f64 = |key: &str| -> f64 {
        fields
            .get(key)
            .and_then(f64::from_firestore_value)
            .unwrap_or(0.0)
    };

    let severity = Severity::from_str(&get_string("severity")).map_err(|e| {
        FirestoreError::InvalidResponse(format!("defects[{}]: {}", index, e))
    })?;

    Ok(DefectRecord {
        key: get_string("key"),
        defect_type: DefectType::parse_lenient(&get_string("type")),
        location: get_string("location"),
        description: get_string("description"),
        severity,
        timestamp: get_f64("timestamp"),
        confidence: get_f64("confidence"),
        asset_ref: fields
            .get("asset_ref")
            .and_then(String::from_firestore_value)
            .map(AssetRef::new),
    })
}

fn document_to_report(doc: &Document, report_id: &ReportId) -> FirestoreResult<ConditionReport> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| FirestoreError::InvalidResponse("Document has no fields".to_string()))?;

    let defects = match fields.get("defects").and_then(Value::as_array) {
        Some(values) => values
            .iter()
            .enumerate()
            .map(|(i, v)| value_to_defect(v, i))
            .collect::<FirestoreResult<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(ConditionReport {
        id: report_id.clone(),
        created_at: fields
            .get("created_at")
            .and_then(chrono::DateTime::from_firestore_value)
            .unwrap_or_else(Utc::now),
        source_ref: fields.get("source_ref").and_then(String::from_firestore_value),
        defects,
    })
}
