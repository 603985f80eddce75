//! Condition report models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::defect::DefectRecord;

/// Unique identifier for a condition report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ReportId(pub String);

impl ReportId {
    /// Generate a new random report ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReportId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReportId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Persisted aggregate of all detections for one pipeline run.
///
/// Written once with a single create; never edited afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConditionReport {
    pub id: ReportId,
    pub created_at: DateTime<Utc>,
    /// Where the walkthrough video came from (URL or upload name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    /// Defects in chronological detection order
    pub defects: Vec<DefectRecord>,
}

impl ConditionReport {
    /// Compose a new report with a fresh id stamped now.
    pub fn new(source_ref: Option<String>, defects: Vec<DefectRecord>) -> Self {
        Self {
            id: ReportId::new(),
            created_at: Utc::now(),
            source_ref,
            defects,
        }
    }

    /// Number of defects that have a stored screenshot.
    pub fn defects_with_assets(&self) -> usize {
        self.defects.iter().filter(|d| d.asset_ref.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_ids_are_unique() {
        let a = ConditionReport::new(None, vec![]);
        let b = ConditionReport::new(None, vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_report_id_display() {
        let id = ReportId::from("abc-123");
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn test_source_ref_omitted_when_absent() {
        let report = ConditionReport::new(None, vec![]);
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("source_ref").is_none());
        assert_eq!(value["defects"].as_array().unwrap().len(), 0);
    }
}
