//! ReaperLoop - reports tasks stuck in `in_progress`.
//!
//! A processor that crashes mid-task leaves its record in `in_progress`
//! forever. The reaper only detects and reports; putting the task back is
//! an operator decision (`TaskQueue::requeue`), because a long transcode
//! and a dead processor look the same from the filesystem.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::{QueueDir, TaskId};
use crate::error::Result;
use crate::queue::TaskQueue;
use crate::util::blocking;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleTask {
    pub id: TaskId,
    /// `claimed_at`, or `created_at` for records claimed before it was stamped.
    pub since: DateTime<Utc>,
    pub stuck_secs: i64,
}

/// In-progress tasks older than `threshold`, oldest first.
pub fn find_stale(queue: &TaskQueue, threshold: chrono::Duration) -> Result<Vec<StaleTask>> {
    let now = queue.clock().now();
    let mut stale: Vec<StaleTask> = queue
        .records_in(QueueDir::InProgress)?
        .into_iter()
        .filter_map(|record| {
            let since = record.claimed_at.unwrap_or(record.created_at);
            let age = now - since;
            (age > threshold).then(|| StaleTask {
                id: record.id,
                since,
                stuck_secs: age.num_seconds(),
            })
        })
        .collect();
    stale.sort_by_key(|t| t.since);
    Ok(stale)
}

pub struct ReaperLoop {
    queue: Arc<TaskQueue>,
    threshold: chrono::Duration,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(queue: Arc<TaskQueue>, threshold: chrono::Duration, interval: Duration) -> Self {
        Self {
            queue,
            threshold,
            interval,
        }
    }

    pub async fn tick(&self) -> Result<Vec<StaleTask>> {
        let queue = Arc::clone(&self.queue);
        let threshold = self.threshold;
        let stale = blocking(move || find_stale(&queue, threshold)).await?;
        for task in &stale {
            warn!(
                task_id = %task.id,
                stuck_secs = task.stuck_secs,
                "task stuck in in_progress; requeue it if its processor is gone"
            );
        }
        Ok(stale)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "reaper started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.tick().await {
                warn!(error = %e, "reaper scan failed");
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("reaper stopped");
    }
}
