//! Shared data models for the LeaseGuard backend.
//!
//! This crate provides Serde-serializable types for:
//! - Frames sampled from walkthrough videos
//! - Defect detections and their persisted records
//! - Condition reports
//! - Pipeline run states

pub mod defect;
pub mod frame;
pub mod report;
pub mod run_state;

// Re-export common types
pub use defect::{AssetRef, DefectRecord, DefectType, Detection, ParseSeverityError, Severity};
pub use frame::Frame;
pub use report::{ConditionReport, ReportId};
pub use run_state::RunState;
