//! Outcome model: the terminal result stamped on records in `complete`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Classification of a terminal record.
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / FAILURE / CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
    Cancelled,
}

/// Terminal result of a task.
///
/// - `SUCCESS`: the work ran and its output exists.
/// - `FAILURE`: the work reported an error; a copy sits in `failed`.
/// - `CANCELLED`: never ran; removed from `queued` by a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub finished_at: DateTime<Utc>,

    /// Set on cancelled records that a cascade replaced with a new task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<TaskId>,
}

impl Outcome {
    pub fn success(at: DateTime<Utc>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            reason: None,
            finished_at: at,
            replaced_by: None,
        }
    }

    pub fn failure(reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            reason: Some(reason.into()),
            finished_at: at,
            replaced_by: None,
        }
    }

    pub fn cancelled(reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: OutcomeKind::Cancelled,
            reason: Some(reason.into()),
            finished_at: at,
            replaced_by: None,
        }
    }

    pub fn with_replacement(mut self, id: TaskId) -> Self {
        self.replaced_by = Some(id);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.kind == OutcomeKind::Failure
    }
}
