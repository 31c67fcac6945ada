//! TaskType - the closed set of task kinds and the processors that own them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpindleError;

/// TaskType determines which processor claims a task and which payload it carries.
///
/// The snake_case name is embedded as the suffix of every task id, so the
/// claim loop can filter candidates without opening their files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Scan,
    Rip,
    Transcode,
    Insert,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Scan,
        TaskType::Rip,
        TaskType::Transcode,
        TaskType::Insert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Scan => "scan",
            TaskType::Rip => "rip",
            TaskType::Transcode => "transcode",
            TaskType::Insert => "insert",
        }
    }

    pub fn owner(self) -> Processor {
        match self {
            TaskType::Scan | TaskType::Rip => Processor::Ripper,
            TaskType::Transcode | TaskType::Insert => Processor::Transcoder,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = SpindleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SpindleError::InvalidTaskId(format!("unknown task type {s:?}")))
    }
}

/// A worker process holding exclusive access to one external capability.
///
/// - Ripper: owns the optical drive (scan, rip)
/// - Transcoder: owns the codec tooling and library (transcode, insert)
///
/// Processors never share a task type, so claiming needs no cross-processor lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Processor {
    Ripper,
    Transcoder,
}

impl Processor {
    pub fn owned_types(self) -> Vec<TaskType> {
        TaskType::ALL
            .into_iter()
            .filter(|t| t.owner() == self)
            .collect()
    }

    pub fn owns(self, task_type: TaskType) -> bool {
        task_type.owner() == self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Processor::Ripper => "ripper",
            Processor::Transcoder => "transcoder",
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
