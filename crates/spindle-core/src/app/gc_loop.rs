//! GcLoop - retention and index housekeeping.
//!
//! Each pass:
//! 1. purges `complete` records finished longer ago than the retention
//!    window, except those whose `failed` twin still awaits review
//! 2. compacts the Ordering Index (drops ids no longer in `queued`,
//!    and duplicates)
//! 3. reconciles it: queued records missing from the index are appended
//!    in id order

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{QueueDir, TaskId};
use crate::error::Result;
use crate::queue::TaskQueue;
use crate::queue::index::append_missing;
use crate::util::blocking;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub purged: Vec<TaskId>,
    pub dropped_entries: usize,
    pub restored: Vec<TaskId>,
}

impl GcReport {
    pub fn is_empty(&self) -> bool {
        self.purged.is_empty() && self.dropped_entries == 0 && self.restored.is_empty()
    }
}

pub fn collect(queue: &TaskQueue, retention: chrono::Duration) -> Result<GcReport> {
    let mut report = GcReport {
        purged: purge_complete(queue, retention)?,
        ..GcReport::default()
    };
    let (dropped, restored) = compact_index(queue)?;
    report.dropped_entries = dropped;
    report.restored = restored;
    Ok(report)
}

fn purge_complete(queue: &TaskQueue, retention: chrono::Duration) -> Result<Vec<TaskId>> {
    let store = queue.store();
    let now = queue.clock().now();
    let mut purged = Vec::new();

    for record in queue.records_in(QueueDir::Complete)? {
        let finished = record
            .outcome
            .as_ref()
            .map_or(record.created_at, |o| o.finished_at);
        if now - finished < retention {
            continue;
        }
        if store.contains(&record.id, QueueDir::Failed)? {
            debug!(task_id = %record.id, "keeping audit record while failed copy awaits review");
            continue;
        }
        if store.remove(&record.id, QueueDir::Complete)? {
            purged.push(record.id);
        }
    }
    Ok(purged)
}

fn compact_index(queue: &TaskQueue) -> Result<(usize, Vec<TaskId>)> {
    let index = queue.index();
    let guard = index.lock()?;
    let order = index.read()?;
    let queued = queue.store().list(QueueDir::Queued)?;
    let live: HashSet<&TaskId> = queued.iter().collect();

    let before = order.len();
    let mut seen = HashSet::new();
    let mut compacted: Vec<TaskId> = order
        .into_iter()
        .filter(|id| live.contains(id) && seen.insert(id.clone()))
        .collect();
    let dropped = before - compacted.len();

    let restored: Vec<TaskId> = queued
        .iter()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();
    for id in &restored {
        warn!(task_id = %id, "queued task missing from index; re-appending");
    }
    append_missing(&mut compacted, &restored);

    if dropped > 0 || !restored.is_empty() {
        index.write_locked(&guard, &compacted)?;
    }
    Ok((dropped, restored))
}

pub struct GcLoop {
    queue: Arc<TaskQueue>,
    retention: chrono::Duration,
    interval: Duration,
}

impl GcLoop {
    pub fn new(queue: Arc<TaskQueue>, retention: chrono::Duration, interval: Duration) -> Self {
        Self {
            queue,
            retention,
            interval,
        }
    }

    pub async fn tick(&self) -> Result<GcReport> {
        let queue = Arc::clone(&self.queue);
        let retention = self.retention;
        let report = blocking(move || collect(&queue, retention)).await?;
        if !report.is_empty() {
            info!(
                purged = report.purged.len(),
                dropped_entries = report.dropped_entries,
                restored = report.restored.len(),
                "gc pass"
            );
        }
        Ok(report)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.tick().await {
                warn!(error = %e, "gc pass failed");
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
        debug!("gc stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskDraft, TaskPayload, TaskType};
    use crate::queue::test_support::*;

    fn enqueue_rip(fx: &Fixture, title: u32) -> TaskId {
        fx.queue
            .enqueue_one(TaskDraft::new(TaskPayload::Rip(rip_payload(title))))
            .unwrap()
            .id
    }

    #[test]
    fn purges_only_expired_records_without_failed_twin() {
        let fx = Fixture::new();
        enqueue_rip(&fx, 1);
        enqueue_rip(&fx, 2);
        enqueue_rip(&fx, 3);
        let ok = fx.queue.claim_next(&[TaskType::Rip]).unwrap().unwrap();
        let ok = fx.queue.complete(ok).unwrap();
        let bad = fx.queue.claim_next(&[TaskType::Rip]).unwrap().unwrap();
        let bad = fx.queue.fail(bad, "boom").unwrap();

        fx.clock.advance(chrono::Duration::hours(25));
        let recent = fx.queue.claim_next(&[TaskType::Rip]).unwrap().unwrap();
        let recent = fx.queue.complete(recent).unwrap();

        let report = collect(&fx.queue, chrono::Duration::hours(24)).unwrap();
        assert_eq!(report.purged, vec![ok.id.clone()]);

        let store = fx.queue.store();
        assert!(store.contains(&bad.id, QueueDir::Complete).unwrap());
        assert!(store.contains(&recent.id, QueueDir::Complete).unwrap());
    }

    #[test]
    fn compaction_drops_stale_entries_and_restores_orphans() {
        let fx = Fixture::new();
        let claimed = enqueue_rip(&fx, 1);
        let waiting = enqueue_rip(&fx, 2);
        let orphan = enqueue_rip(&fx, 3);
        fx.queue.claim_next(&[TaskType::Rip]).unwrap();
        fx.queue
            .index()
            .update(|order| {
                order.retain(|x| x != &orphan);
                Ok(())
            })
            .unwrap();
        assert_eq!(
            fx.queue.index().read().unwrap(),
            vec![claimed.clone(), waiting.clone()]
        );

        let report = collect(&fx.queue, chrono::Duration::hours(24)).unwrap();
        assert_eq!(report.dropped_entries, 1);
        assert_eq!(report.restored, vec![orphan.clone()]);
        assert_eq!(fx.queue.index().read().unwrap(), vec![waiting, orphan]);

        assert!(collect(&fx.queue, chrono::Duration::hours(24)).unwrap().is_empty());
    }
}
