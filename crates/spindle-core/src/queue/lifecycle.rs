//! Lifecycle Manager: terminal transitions out of `in_progress`.
//!
//! Writes happen before the `in_progress` copy is removed, so a crash
//! between the two leaves a duplicate rather than a lost task.

use tracing::{info, warn};

use super::TaskQueue;
use crate::domain::{Outcome, QueueDir, TaskRecord};
use crate::error::Result;

impl TaskQueue {
    /// Record success: outcome into `complete`, drop the `in_progress` copy.
    pub fn complete(&self, mut record: TaskRecord) -> Result<TaskRecord> {
        record.outcome = Some(Outcome::success(self.clock.now()));
        self.store.write(&record, QueueDir::Complete)?;
        self.release_in_progress(&record)?;
        info!(task_id = %record.id, "task complete");
        Ok(record)
    }

    /// Record failure: outcome into `complete`, a copy into `failed` for
    /// review, drop the `in_progress` copy.
    pub fn fail(&self, mut record: TaskRecord, reason: impl Into<String>) -> Result<TaskRecord> {
        let outcome = Outcome::failure(reason, self.clock.now());
        warn!(task_id = %record.id, reason = outcome.reason.as_deref().unwrap_or_default(), "task failed");
        record.outcome = Some(outcome);
        self.store.write(&record, QueueDir::Complete)?;
        self.store.write(&record, QueueDir::Failed)?;
        self.release_in_progress(&record)?;
        Ok(record)
    }

    fn release_in_progress(&self, record: &TaskRecord) -> Result<()> {
        if !self.store.remove(&record.id, QueueDir::InProgress)? {
            warn!(task_id = %record.id, "in_progress copy was already gone");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::domain::{OutcomeKind, QueueDir, TaskDraft, TaskPayload, TaskType};

    #[test]
    fn success_lands_only_in_complete() {
        let fx = Fixture::new();
        fx.queue
            .enqueue_one(TaskDraft::new(TaskPayload::Rip(rip_payload(1))))
            .unwrap();
        let claimed = fx.queue.claim_next(&[TaskType::Rip]).unwrap().unwrap();
        let id = claimed.id.clone();

        let done = fx.queue.complete(claimed).unwrap();
        assert_eq!(done.outcome.as_ref().map(|o| o.kind), Some(OutcomeKind::Success));

        let store = fx.queue.store();
        assert!(!store.contains(&id, QueueDir::InProgress).unwrap());
        assert!(!store.contains(&id, QueueDir::Failed).unwrap());
        assert_eq!(store.read(&id, QueueDir::Complete).unwrap(), Some(done));
    }

    #[test]
    fn failure_lands_in_complete_and_failed() {
        let fx = Fixture::new();
        fx.queue
            .enqueue_one(TaskDraft::new(TaskPayload::Rip(rip_payload(1))))
            .unwrap();
        let claimed = fx.queue.claim_next(&[TaskType::Rip]).unwrap().unwrap();
        let id = claimed.id.clone();

        fx.queue.fail(claimed, "drive not ready").unwrap();

        let store = fx.queue.store();
        assert!(!store.contains(&id, QueueDir::InProgress).unwrap());
        let audit = store.read(&id, QueueDir::Complete).unwrap().unwrap();
        let review = store.read(&id, QueueDir::Failed).unwrap().unwrap();
        assert_eq!(audit, review);
        let outcome = review.outcome.unwrap();
        assert!(outcome.is_failure());
        assert_eq!(outcome.reason.as_deref(), Some("drive not ready"));
    }
}
