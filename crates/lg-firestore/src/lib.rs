//! Firestore REST API client.
//!
//! This crate provides:
//! - The condition report repository (atomic create, point lookup)
//! - Service account authentication via gcp_auth, with token caching
//! - Retry with exponential backoff for transient failures

pub mod client;
pub mod error;
pub mod metrics;
pub mod report_repo;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use report_repo::{ConditionReportRepository, REPORTS_COLLECTION};
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
