//! Status - read-only view of the queue for operators and UIs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{OutcomeKind, QueueDir, TaskId, TaskRecord, TaskType};
use crate::error::Result;
use crate::queue::TaskQueue;
use crate::queue::dependency::{downstream_of, is_ready};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub short_id: String,
    pub task_type: TaskType,
    pub dir: QueueDir,
    pub input: Option<String>,
    pub output: Option<String>,
    /// Time spent in the current directory.
    pub elapsed_secs: i64,
    /// Index position; queued tasks only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Whether the input exists yet; queued tasks only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Queued tasks that transitively wait on this failed task's output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub downstream: Vec<TaskId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub taken_at: DateTime<Utc>,
    pub counts: QueueCounts,
    /// Queued tasks in claim order, then any missing from the index.
    pub queued: Vec<TaskView>,
    pub in_progress: Vec<TaskView>,
    pub failed: Vec<TaskView>,
    /// Empty unless requested; the audit trail grows until gc.
    pub complete: Vec<TaskView>,
}

pub fn counts(queue: &TaskQueue) -> Result<QueueCounts> {
    let store = queue.store();
    Ok(QueueCounts {
        queued: store.list(QueueDir::Queued)?.len(),
        in_progress: store.list(QueueDir::InProgress)?.len(),
        complete: store.list(QueueDir::Complete)?.len(),
        failed: store.list(QueueDir::Failed)?.len(),
    })
}

pub fn snapshot(queue: &TaskQueue, include_complete: bool) -> Result<QueueSnapshot> {
    let now = queue.clock().now();
    let order = queue.index().read()?;
    let position: HashMap<&TaskId, usize> =
        order.iter().enumerate().map(|(i, id)| (id, i)).collect();

    let mut queued = queue.records_in(QueueDir::Queued)?;
    queued.sort_by_key(|r| (position.get(&r.id).copied().unwrap_or(usize::MAX), r.id.clone()));

    let queued_views = queued
        .iter()
        .map(|r| {
            let mut view = view_of(r, QueueDir::Queued, now);
            view.position = position.get(&r.id).copied();
            view.ready = Some(is_ready(r));
            view
        })
        .collect();

    let in_progress = queue
        .records_in(QueueDir::InProgress)?
        .iter()
        .map(|r| view_of(r, QueueDir::InProgress, now))
        .collect();

    let failed = queue
        .records_in(QueueDir::Failed)?
        .iter()
        .map(|r| {
            let mut view = view_of(r, QueueDir::Failed, now);
            if let Some(output) = &r.output {
                view.downstream = downstream_of(output, &queued)
                    .into_iter()
                    .map(|d| d.id.clone())
                    .collect();
            }
            view
        })
        .collect();

    let complete = if include_complete {
        queue
            .records_in(QueueDir::Complete)?
            .iter()
            .map(|r| view_of(r, QueueDir::Complete, now))
            .collect()
    } else {
        Vec::new()
    };

    Ok(QueueSnapshot {
        taken_at: now,
        counts: counts(queue)?,
        queued: queued_views,
        in_progress,
        failed,
        complete,
    })
}

fn view_of(record: &TaskRecord, dir: QueueDir, now: DateTime<Utc>) -> TaskView {
    let entered = match dir {
        QueueDir::Queued => record.created_at,
        QueueDir::InProgress => record.claimed_at.unwrap_or(record.created_at),
        QueueDir::Complete | QueueDir::Failed => record
            .outcome
            .as_ref()
            .map_or(record.created_at, |o| o.finished_at),
    };
    TaskView {
        id: record.id.clone(),
        short_id: record.id.short(),
        task_type: record.task_type(),
        dir,
        input: record.input.as_ref().map(|p| p.display().to_string()),
        output: record.output.as_ref().map(|p| p.display().to_string()),
        elapsed_secs: (now - entered).num_seconds().max(0),
        position: None,
        ready: None,
        outcome: record.outcome.as_ref().map(|o| o.kind),
        reason: record.outcome.as_ref().and_then(|o| o.reason.clone()),
        downstream: Vec::new(),
    }
}
