//! Progress side channel.
//!
//! Best effort and in-process only: events go to whoever is subscribed at
//! the moment, are dropped when nobody listens, and never touch the queue.

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::{ProgressEvent, TaskId};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Slow subscribers lag and lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn for_task(&self, task_id: &TaskId) -> TaskProgress {
        TaskProgress {
            task_id: task_id.clone(),
            tx: Some(self.tx.clone()),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Handle given to a running handler.
#[derive(Debug, Clone)]
pub struct TaskProgress {
    task_id: TaskId,
    tx: Option<broadcast::Sender<ProgressEvent>>,
}

impl TaskProgress {
    /// A handle that reports nowhere.
    pub fn detached(task_id: TaskId) -> Self {
        Self { task_id, tx: None }
    }

    pub fn percent(&self, percent: f32) {
        self.emit(ProgressEvent::percent(self.task_id.clone(), percent));
    }

    pub fn message(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::message(self.task_id.clone(), message));
    }

    fn emit(&self, event: ProgressEvent) {
        trace!(task_id = %event.task_id, percent = ?event.percent, message = ?event.message, "progress");
        if let Some(tx) = &self.tx {
            // No receivers is fine.
            let _ = tx.send(event);
        }
    }
}
