//! Events - progress reported by executing tasks.
//!
//! Progress travels on a side channel only. It is never persisted and never
//! affects readiness or completion.

use serde::{Deserialize, Serialize};

use super::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,

    /// 0.0 ..= 100.0 when the work can estimate it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn percent(task_id: TaskId, percent: f32) -> Self {
        Self {
            task_id,
            percent: Some(percent.clamp(0.0, 100.0)),
            message: None,
        }
    }

    pub fn message(task_id: TaskId, message: impl Into<String>) -> Self {
        Self {
            task_id,
            percent: None,
            message: Some(message.into()),
        }
    }
}
