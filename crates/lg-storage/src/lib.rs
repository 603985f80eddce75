//! Cloudflare R2 storage for condition report assets.
//!
//! This crate provides:
//! - JPEG still upload under a unique key
//! - Presigned URL generation for report viewers
//! - Connectivity checks

pub mod assets;
pub mod client;
pub mod error;

pub use assets::{asset_key, ASSET_CONTENT_TYPE, ASSET_PREFIX};
pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
