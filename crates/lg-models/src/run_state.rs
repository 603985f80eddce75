//! Lifecycle of a single inspection run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one pipeline run.
///
/// ```text
/// Ingested -> Segmented -> Classified -> Assembled -> Persisted
///    |                                      |
///    +--------------> Failed <--------------+
/// ```
///
/// Per-frame and per-asset failures degrade inside a state; only a decode
/// failure or a persistence failure move a run to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Ingested,
    Segmented,
    Classified,
    Assembled,
    Persisted,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Ingested => "ingested",
            RunState::Segmented => "segmented",
            RunState::Classified => "classified",
            RunState::Assembled => "assembled",
            RunState::Persisted => "persisted",
            RunState::Failed => "failed",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Ingested, RunState::Segmented)
                | (RunState::Ingested, RunState::Failed)
                | (RunState::Segmented, RunState::Classified)
                | (RunState::Classified, RunState::Assembled)
                | (RunState::Assembled, RunState::Persisted)
                | (RunState::Assembled, RunState::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Persisted | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
