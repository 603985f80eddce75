//! Walkthrough inspection worker.
//!
//! This crate provides:
//! - Per-frame defect classification against a vision model
//! - Report assembly with asset upload
//! - The end-to-end inspection pipeline
//! - Run lifecycle logging

pub mod assembler;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod pipeline;

pub use assembler::{AssetStore, ReportAssembler, ReportStore};
pub use classifier::{ClassificationError, DefectClassifier, VisionModel};
pub use config::PipelineConfig;
pub use error::{WorkerError, WorkerResult};
pub use gemini::{GeminiClient, GeminiConfig};
pub use logging::RunLogger;
pub use pipeline::{DetectionSummary, InspectionPipeline, RunSummary};
