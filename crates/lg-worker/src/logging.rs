//! Structured run logging.

use lg_models::RunState;
use tracing::{error, info, warn, Span};

/// Logger for one inspection run.
///
/// Every line carries the run id and operation so a run can be followed
/// through interleaved output.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    operation: String,
}

impl RunLogger {
    pub fn new(run_id: impl Into<String>, operation: &str) -> Self {
        Self {
            run_id: run_id.into(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run started: {}", message
        );
    }

    /// Log a lifecycle transition.
    pub fn log_state(&self, state: RunState, message: &str) {
        if state == RunState::Failed {
            error!(
                run_id = %self.run_id,
                operation = %self.operation,
                state = %state,
                "Run failed: {}", message
            );
        } else {
            info!(
                run_id = %self.run_id,
                operation = %self.operation,
                state = %state,
                "{}", message
            );
        }
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_logger_creation() {
        let logger = RunLogger::new("run-123", "inspection");
        assert_eq!(logger.run_id(), "run-123");
        assert_eq!(logger.operation(), "inspection");
    }
}
