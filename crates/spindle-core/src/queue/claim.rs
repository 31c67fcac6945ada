//! Claim Engine: take the first ready task of the owned types.
//!
//! Order of candidates is the Ordering Index order at scan time. A task
//! that is not ready is skipped, never waited on, so a later ready task
//! may be claimed ahead of it.

use tracing::{debug, info, warn};

use super::TaskQueue;
use super::dependency::is_ready;
use crate::domain::{QueueDir, TaskRecord, TaskType};
use crate::error::{Result, SpindleError};
use crate::ports::MoveOutcome;

impl TaskQueue {
    /// Claim at most one task whose type is in `owned`.
    ///
    /// Returns `Ok(None)` when nothing is ready. Losing a race to another
    /// claimer is not an error; scanning simply continues.
    pub fn claim_next(&self, owned: &[TaskType]) -> Result<Option<TaskRecord>> {
        let order = self.index.read()?;

        for id in order.iter().filter(|id| owned.contains(&id.task_type())) {
            let record = match self.store.read(id, QueueDir::Queued) {
                Ok(Some(record)) => record,
                // Stale index entry: the task already moved on.
                Ok(None) => continue,
                Err(SpindleError::MalformedRecord { path, source }) => {
                    warn!(task_id = %id, path = %path.display(), error = %source, "skipping malformed queued record");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !is_ready(&record) {
                debug!(task_id = %id, input = ?record.input, "input not available yet");
                continue;
            }

            match self.store.move_record(id, QueueDir::Queued, QueueDir::InProgress)? {
                MoveOutcome::Moved => {}
                MoveOutcome::AlreadyTaken => {
                    debug!(task_id = %id, "lost claim race");
                    continue;
                }
            }

            let mut record = record;
            record.claimed_at = Some(self.clock.now());
            self.store.write(&record, QueueDir::InProgress)?;
            info!(task_id = %id, task_type = %id.task_type(), "task claimed");
            return Ok(Some(record));
        }

        Ok(None)
    }
}
