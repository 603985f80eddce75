//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that end a run.
///
/// Only `DecodeFailed` and `PersistFailed` come out of the pipeline itself;
/// per-frame and per-asset failures are absorbed where they happen.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The video could not be probed or yielded no frames.
    #[error("cannot process video: {0}")]
    DecodeFailed(String),

    /// The assembled report could not be written.
    #[error("report could not be saved: {0}")]
    PersistFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] lg_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] lg_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] lg_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn decode_failed(msg: impl Into<String>) -> Self {
        Self::DecodeFailed(msg.into())
    }

    pub fn persist_failed(msg: impl Into<String>) -> Self {
        Self::PersistFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Short, user-facing reason for a failed run.
    pub fn user_message(&self) -> &'static str {
        match self {
            WorkerError::DecodeFailed(_) | WorkerError::Media(_) => "cannot process video",
            WorkerError::PersistFailed(_) | WorkerError::Firestore(_) => "report could not be saved",
            WorkerError::ConfigError(_) => "worker is misconfigured",
            WorkerError::Storage(_) | WorkerError::Io(_) => "internal error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_messages() {
        assert_eq!(
            WorkerError::decode_failed("no frames").to_string(),
            "cannot process video: no frames"
        );
        assert_eq!(
            WorkerError::persist_failed("503").user_message(),
            "report could not be saved"
        );
        assert_eq!(
            WorkerError::from(lg_media::MediaError::FfprobeNotFound).user_message(),
            "cannot process video"
        );
    }
}
