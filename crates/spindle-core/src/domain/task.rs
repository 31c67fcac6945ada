//! Task Record: the persisted unit of work.
//!
//! On disk a record is one flat JSON object:
//! `{id, type, created_at, input, output, ...payload}` plus the bookkeeping
//! fields the queue stamps as the task moves (`claimed_at`, `outcome`, ...).
//! `input` and `output` are always written, as `null` when absent.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Outcome, TaskId, TaskType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPayload {
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RipPayload {
    pub device: String,
    /// Disc title (track) selector.
    pub title: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodePayload {
    pub preset: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

/// Type-specific fields, keyed by the record's `type`.
///
/// The queue never looks inside; only handlers do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    Scan(ScanPayload),
    Rip(RipPayload),
    Transcode(TranscodePayload),
    Insert(InsertPayload),
}

impl TaskPayload {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::Scan(_) => TaskType::Scan,
            TaskPayload::Rip(_) => TaskType::Rip,
            TaskPayload::Transcode(_) => TaskType::Transcode,
            TaskPayload::Insert(_) => TaskType::Insert,
        }
    }
}

/// What a creator supplies; the queue assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub payload: TaskPayload,
}

impl TaskDraft {
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            input: None,
            output: None,
            payload,
        }
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub created_at: DateTime<Utc>,

    /// `None` means ready immediately.
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,

    #[serde(flatten)]
    pub payload: TaskPayload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    /// The failed task this one was resubmitted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resubmitted_from: Option<TaskId>,

    /// The queued task this one superseded during a cascade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<TaskId>,
}

impl TaskRecord {
    pub fn from_draft(id: TaskId, created_at: DateTime<Utc>, draft: TaskDraft) -> Self {
        Self {
            id,
            created_at,
            input: draft.input,
            output: draft.output,
            payload: draft.payload,
            claimed_at: None,
            outcome: None,
            resubmitted_from: None,
            replaces: None,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }

    /// The id suffix and the payload tag must name the same type.
    pub fn is_consistent(&self) -> bool {
        self.id.task_type() == self.task_type()
    }

    /// Draft for a fresh copy of this task (no bookkeeping carried over).
    pub fn to_draft(&self) -> TaskDraft {
        TaskDraft {
            input: self.input.clone(),
            output: self.output.clone(),
            payload: self.payload.clone(),
        }
    }

    pub fn consumes(&self, path: &Path) -> bool {
        self.input.as_deref() == Some(path)
    }

    /// Output to promise once this task's input moves to `new_input`.
    ///
    /// When the output file is named after the input (same stem), the new
    /// output follows the new input's stem; otherwise the output is kept.
    pub fn output_for_input(&self, new_input: &Path) -> Option<PathBuf> {
        let output = self.output.as_ref()?;
        let follows_input = self
            .input
            .as_deref()
            .and_then(Path::file_stem)
            .is_some_and(|stem| Some(stem) == output.file_stem());
        if !follows_input {
            return Some(output.clone());
        }
        let Some(new_stem) = new_input.file_stem() else {
            return Some(output.clone());
        };
        let mut name = new_stem.to_os_string();
        if let Some(ext) = output.extension() {
            name.push(".");
            name.push(ext);
        }
        Some(output.with_file_name(name))
    }
}
