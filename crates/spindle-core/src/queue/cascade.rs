//! Cascade/Resubmit Engine: operator actions on reviewed tasks.
//!
//! Each action runs entirely under the index lock, so it is one transaction
//! relative to other creators. Queued tasks are still claimable while we
//! work; every takeover of a queued record goes through `move_record`, and a
//! lost race is logged and left alone. A replacement is always written before
//! its original is taken, and a store error part way through undoes the
//! record changes already made.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::dependency::{direct_consumers, downstream_of};
use super::index::{append_missing, move_to_front, replace_entry};
use super::TaskQueue;
use crate::domain::{Outcome, QueueDir, TaskDraft, TaskId, TaskPayload, TaskRecord};
use crate::error::{Result, SpindleError};
use crate::ports::MoveOutcome;

/// Edits applied to a failed task when it is resubmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resubmission {
    /// Replacement payload; must be of the same task type.
    pub payload: Option<TaskPayload>,
    /// New output location; downstream tasks are re-pointed when it changes.
    pub output: Option<PathBuf>,
    /// Drop the output entirely. Consumers of the old output are cancelled.
    pub clear_output: bool,
}

impl Resubmission {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, payload: TaskPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self.clear_output = false;
        self
    }

    pub fn without_output(mut self) -> Self {
        self.output = None;
        self.clear_output = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubmitReport {
    pub task: TaskRecord,
    /// Queued tasks cancelled because their input moved.
    pub cancelled: Vec<TaskId>,
    /// Their replacements, in cascade order.
    pub replacements: Vec<TaskRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReport {
    pub removed: TaskId,
    pub cancelled: Vec<TaskId>,
}

/// Record changes made so far by a cascade, undone in reverse when a later
/// step fails. The index write is the commit point: nothing is logged after it.
#[derive(Debug, Default)]
struct UndoLog {
    steps: Vec<Undo>,
}

#[derive(Debug)]
enum Undo {
    /// A new record written into `queued`.
    Created(TaskId),
    /// A queued record moved into `complete` as cancelled; holds the original.
    Cancelled(TaskRecord),
    /// The failed record removed from `failed`.
    Dismissed(TaskRecord),
}

impl TaskQueue {
    /// Re-enqueue a failed task, optionally with edits.
    ///
    /// When the output location changes, every queued consumer of the old
    /// output is cancelled and replaced by a copy reading the new output,
    /// transitively. Any error before the index is rewritten rolls the record
    /// changes back, so the failed task can simply be resubmitted again.
    pub fn resubmit(&self, id: &TaskId, edits: Resubmission) -> Result<ResubmitReport> {
        let guard = self.index.lock()?;
        let failed = self.require(id, QueueDir::Failed)?;
        let mut order = self.index.read()?;
        order.retain(|x| x != &failed.id);

        let mut draft = failed.to_draft();
        if let Some(payload) = edits.payload {
            if payload.task_type() != failed.task_type() {
                return Err(SpindleError::PayloadTypeMismatch {
                    expected: failed.task_type(),
                    found: payload.task_type(),
                });
            }
            draft.payload = payload;
        }
        if edits.clear_output {
            draft.output = None;
        } else if let Some(output) = edits.output {
            draft.output = Some(output);
        }

        let mut undo = UndoLog::default();
        let result = self
            .resubmit_records(&failed, draft, &mut order, &mut undo)
            .and_then(|report| {
                self.index.write_locked(&guard, &order)?;
                Ok(report)
            });
        match result {
            Ok(report) => {
                info!(
                    task_id = %failed.id,
                    new_task_id = %report.task.id,
                    cancelled = report.cancelled.len(),
                    "task resubmitted"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(task_id = %failed.id, error = %e, "resubmit failed; rolling back");
                self.roll_back(undo);
                Err(e)
            }
        }
    }

    fn resubmit_records(
        &self,
        failed: &TaskRecord,
        draft: TaskDraft,
        order: &mut Vec<TaskId>,
        undo: &mut UndoLog,
    ) -> Result<ResubmitReport> {
        let mut task = self.new_record(draft)?;
        task.resubmitted_from = Some(failed.id.clone());
        self.store.write(&task, QueueDir::Queued)?;
        undo.steps.push(Undo::Created(task.id.clone()));
        append_missing(order, std::slice::from_ref(&task.id));

        let mut report = ResubmitReport {
            task,
            cancelled: Vec::new(),
            replacements: Vec::new(),
        };
        if let Some(old) = failed.output.as_deref()
            && report.task.output.as_deref() != Some(old)
        {
            let new = report.task.output.clone();
            self.repoint_downstream(old, new, order, &mut report, undo)?;
        }

        self.dismiss(failed, undo)?;
        Ok(report)
    }

    /// Dismiss a failed task; with `downstream`, also cancel everything
    /// queued that transitively depends on its output.
    pub fn cancel(&self, id: &TaskId, downstream: bool) -> Result<CancelReport> {
        let guard = self.index.lock()?;
        let failed = self.require(id, QueueDir::Failed)?;

        let mut order = self.index.read()?;
        order.retain(|x| x != &failed.id);

        let mut report = CancelReport {
            removed: failed.id.clone(),
            cancelled: Vec::new(),
        };
        let mut undo = UndoLog::default();
        let result = self
            .cancel_records(&failed, downstream, &mut order, &mut report, &mut undo)
            .and_then(|()| self.index.write_locked(&guard, &order));
        if let Err(e) = result {
            warn!(task_id = %failed.id, error = %e, "cancel failed; rolling back");
            self.roll_back(undo);
            return Err(e);
        }
        info!(task_id = %failed.id, cancelled = report.cancelled.len(), "failed task cancelled");
        Ok(report)
    }

    fn cancel_records(
        &self,
        failed: &TaskRecord,
        downstream: bool,
        order: &mut Vec<TaskId>,
        report: &mut CancelReport,
        undo: &mut UndoLog,
    ) -> Result<()> {
        if downstream && let Some(output) = failed.output.as_deref() {
            let queued = self.records_in(QueueDir::Queued)?;
            let reason = format!("upstream task {} was cancelled", failed.id);
            for record in downstream_of(output, &queued) {
                if self.take_queued(record, undo)? {
                    self.stamp_cancelled(record, &reason, None)?;
                    order.retain(|x| x != &record.id);
                    report.cancelled.push(record.id.clone());
                }
            }
        }
        self.dismiss(failed, undo)
    }

    /// Queued tasks that transitively depend on the output of failed task `id`.
    pub fn downstream(&self, id: &TaskId) -> Result<Vec<TaskRecord>> {
        let record = self.require(id, QueueDir::Failed)?;
        let Some(output) = record.output.as_deref() else {
            return Ok(Vec::new());
        };
        let queued = self.records_in(QueueDir::Queued)?;
        Ok(downstream_of(output, &queued).into_iter().cloned().collect())
    }

    /// Return a stuck `in_progress` task to `queued`.
    pub fn requeue(&self, id: &TaskId) -> Result<TaskRecord> {
        let guard = self.index.lock()?;
        let mut record = self.require(id, QueueDir::InProgress)?;

        // Rewrite before moving: once in `queued` the record belongs to claimers.
        record.claimed_at = None;
        self.store.write(&record, QueueDir::InProgress)?;
        match self.store.move_record(id, QueueDir::InProgress, QueueDir::Queued)? {
            MoveOutcome::Moved => {}
            MoveOutcome::AlreadyTaken => {
                return Err(SpindleError::TaskNotFound {
                    id: id.to_string(),
                    dir: QueueDir::InProgress,
                });
            }
        }

        let mut order = self.index.read()?;
        append_missing(&mut order, std::slice::from_ref(id));
        self.index.write_locked(&guard, &order)?;
        warn!(task_id = %id, "task requeued from in_progress");
        Ok(record)
    }

    /// Move a queued task to the head of the index.
    pub fn prioritize(&self, id: &TaskId) -> Result<()> {
        self.index.update(|order| {
            self.require(id, QueueDir::Queued)?;
            move_to_front(order, id);
            Ok(())
        })?;
        info!(task_id = %id, "task prioritized");
        Ok(())
    }

    fn require(&self, id: &TaskId, dir: QueueDir) -> Result<TaskRecord> {
        self.store
            .read(id, dir)?
            .ok_or_else(|| SpindleError::TaskNotFound {
                id: id.to_string(),
                dir,
            })
    }

    /// Breadth-first over consumers of `old`, one level of path change at a time.
    ///
    /// With a new path each consumer is replaced by a copy reading it; if the
    /// copy's output differs too, the walk continues from that output. With
    /// no new path nothing will ever produce the input, so consumers are
    /// cancelled outright.
    fn repoint_downstream(
        &self,
        old: &Path,
        new: Option<PathBuf>,
        order: &mut Vec<TaskId>,
        report: &mut ResubmitReport,
        undo: &mut UndoLog,
    ) -> Result<()> {
        let queued = self.records_in(QueueDir::Queued)?;
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut frontier = VecDeque::from([(old.to_path_buf(), new)]);

        while let Some((old_path, new_path)) = frontier.pop_front() {
            for original in direct_consumers(&old_path, &queued) {
                if !seen.insert(original.id.clone()) {
                    continue;
                }

                let Some(new_input) = new_path.as_deref() else {
                    if self.take_queued(original, undo)? {
                        let reason = format!("input {} will no longer be produced", old_path.display());
                        self.stamp_cancelled(original, &reason, None)?;
                        order.retain(|x| x != &original.id);
                        report.cancelled.push(original.id.clone());
                        if let Some(out) = &original.output {
                            frontier.push_back((out.clone(), None));
                        }
                    }
                    continue;
                };

                let new_output = original.output_for_input(new_input);
                let mut draft = original.to_draft();
                draft.input = Some(new_input.to_path_buf());
                draft.output = new_output.clone();
                let mut replacement = self.new_record(draft)?;
                replacement.replaces = Some(original.id.clone());

                // The replacement exists before the original goes, so a failure
                // in between never leaves the chain without a consumer.
                self.store.write(&replacement, QueueDir::Queued)?;
                undo.steps.push(Undo::Created(replacement.id.clone()));
                if !self.take_queued(original, undo)? {
                    self.store.remove(&replacement.id, QueueDir::Queued)?;
                    continue;
                }
                let reason = format!("input moved to {}", new_input.display());
                self.stamp_cancelled(original, &reason, Some(&replacement.id))?;
                replace_entry(order, &original.id, replacement.id.clone());
                info!(task_id = %original.id, replacement = %replacement.id, "downstream task replaced");

                if let Some(out) = &original.output
                    && new_output.as_ref() != Some(out)
                {
                    frontier.push_back((out.clone(), new_output.clone()));
                }
                report.cancelled.push(original.id.clone());
                report.replacements.push(replacement);
            }
        }
        Ok(())
    }

    /// Take a queued task into `complete`. Returns false when a claimer got it first.
    fn take_queued(&self, record: &TaskRecord, undo: &mut UndoLog) -> Result<bool> {
        match self.store.move_record(&record.id, QueueDir::Queued, QueueDir::Complete)? {
            MoveOutcome::Moved => {
                undo.steps.push(Undo::Cancelled(record.clone()));
                Ok(true)
            }
            MoveOutcome::AlreadyTaken => {
                warn!(task_id = %record.id, "downstream task was claimed during cascade; left untouched");
                Ok(false)
            }
        }
    }

    /// Rewrite a task already taken into `complete` with a cancelled outcome.
    fn stamp_cancelled(
        &self,
        record: &TaskRecord,
        reason: &str,
        replaced_by: Option<&TaskId>,
    ) -> Result<()> {
        let mut outcome = Outcome::cancelled(reason, self.clock.now());
        if let Some(id) = replaced_by {
            outcome = outcome.with_replacement(id.clone());
        }
        let mut cancelled = record.clone();
        cancelled.outcome = Some(outcome);
        self.store.write(&cancelled, QueueDir::Complete)?;
        info!(task_id = %record.id, reason, "queued task cancelled");
        Ok(())
    }

    fn dismiss(&self, failed: &TaskRecord, undo: &mut UndoLog) -> Result<()> {
        if self.store.remove(&failed.id, QueueDir::Failed)? {
            undo.steps.push(Undo::Dismissed(failed.clone()));
        }
        Ok(())
    }

    /// Best effort: a step that cannot be undone is logged and the rest still run.
    fn roll_back(&self, undo: UndoLog) {
        for step in undo.steps.into_iter().rev() {
            let result = match &step {
                Undo::Created(id) => self.store.remove(id, QueueDir::Queued).map(drop),
                Undo::Cancelled(original) => self
                    .store
                    .write(original, QueueDir::Queued)
                    .and_then(|()| self.store.remove(&original.id, QueueDir::Complete).map(drop)),
                Undo::Dismissed(failed) => self.store.write(failed, QueueDir::Failed),
            };
            if let Err(e) = result {
                warn!(?step, error = %e, "rollback step failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::{InsertPayload, OutcomeKind, TaskDraft, TaskType, TranscodePayload};

    fn fail_next(fx: &Fixture, owned: &[TaskType]) -> TaskRecord {
        let claimed = fx.queue.claim_next(owned).unwrap().expect("claimable task");
        fx.queue.fail(claimed, "boom").unwrap()
    }

    fn insert_draft(fx: &Fixture, input: &str) -> TaskDraft {
        TaskDraft::new(TaskPayload::Insert(InsertPayload {
            title: "A".into(),
            year: None,
        }))
        .with_input(fx.media(input))
    }

    #[test]
    fn resubmit_with_unchanged_output_touches_nothing_else() {
        let fx = Fixture::new();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let report = fx.queue.resubmit(&failed.id, Resubmission::unchanged()).unwrap();
        assert!(report.cancelled.is_empty());
        assert_eq!(report.task.resubmitted_from.as_ref(), Some(&failed.id));
        assert_eq!(report.task.output, failed.output);

        let store = fx.queue.store();
        assert!(!store.contains(&failed.id, QueueDir::Failed).unwrap());
        assert!(store.contains(&failed.id, QueueDir::Complete).unwrap());
        assert_eq!(
            store.read(&transcode.id, QueueDir::Queued).unwrap(),
            Some(transcode.clone())
        );
        assert_eq!(fx.queue.index().read().unwrap().last(), Some(&report.task.id));
    }

    #[test]
    fn resubmit_with_new_output_replaces_downstream_transitively() {
        let fx = Fixture::new();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let insert = fx.queue.enqueue_one(insert_draft(&fx, "A.mp4")).unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let report = fx
            .queue
            .resubmit(&failed.id, Resubmission::unchanged().with_output(fx.media("A-v2.mkv")))
            .unwrap();

        assert_eq!(report.cancelled, vec![transcode.id.clone(), insert.id.clone()]);
        let new_transcode = &report.replacements[0];
        let new_insert = &report.replacements[1];
        assert_eq!(new_transcode.input, Some(fx.media("A-v2.mkv")));
        assert_eq!(new_transcode.output, Some(fx.media("A-v2.mp4")));
        assert_eq!(new_transcode.replaces.as_ref(), Some(&transcode.id));
        assert_eq!(new_insert.input, Some(fx.media("A-v2.mp4")));

        let store = fx.queue.store();
        let cancelled = store.read(&transcode.id, QueueDir::Complete).unwrap().unwrap();
        let outcome = cancelled.outcome.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Cancelled);
        assert_eq!(outcome.replaced_by.as_ref(), Some(&new_transcode.id));
        assert!(!store.contains(&transcode.id, QueueDir::Queued).unwrap());

        // Replacements keep their originals' slots; the resubmission goes last.
        let order = fx.queue.index().read().unwrap();
        let live: Vec<_> = order
            .into_iter()
            .filter(|id| store.contains(id, QueueDir::Queued).unwrap())
            .collect();
        assert_eq!(
            live,
            vec![new_transcode.id.clone(), new_insert.id.clone(), report.task.id.clone()]
        );
    }

    #[test]
    fn output_not_named_after_input_stops_the_cascade() {
        let fx = Fixture::new();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("movie.mp4"))
            .unwrap();
        let insert = fx.queue.enqueue_one(insert_draft(&fx, "movie.mp4")).unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let report = fx
            .queue
            .resubmit(&failed.id, Resubmission::unchanged().with_output(fx.media("B.mkv")))
            .unwrap();

        assert_eq!(report.cancelled, vec![transcode.id]);
        assert_eq!(report.replacements[0].output, Some(fx.media("movie.mp4")));
        assert!(fx.queue.store().contains(&insert.id, QueueDir::Queued).unwrap());
    }

    #[test]
    fn clearing_the_output_cancels_consumers_without_replacement() {
        let fx = Fixture::new();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let insert = fx.queue.enqueue_one(insert_draft(&fx, "A.mp4")).unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let report = fx
            .queue
            .resubmit(&failed.id, Resubmission::unchanged().without_output())
            .unwrap();

        assert_eq!(report.task.output, None);
        assert_eq!(report.cancelled, vec![transcode.id, insert.id]);
        assert!(report.replacements.is_empty());
        assert_eq!(fx.queue.index().read().unwrap(), vec![report.task.id.clone()]);
    }

    #[test]
    fn resubmit_rejects_payload_of_another_type() {
        let fx = Fixture::new();
        fx.queue
            .enqueue_one(TaskDraft::new(TaskPayload::Rip(rip_payload(1))))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let err = fx
            .queue
            .resubmit(
                &failed.id,
                Resubmission::unchanged().with_payload(TaskPayload::Transcode(TranscodePayload {
                    preset: "fast".into(),
                })),
            )
            .unwrap_err();
        assert!(matches!(err, SpindleError::PayloadTypeMismatch { .. }));
        assert!(fx.queue.store().contains(&failed.id, QueueDir::Failed).unwrap());
    }

    #[test]
    fn resubmit_of_unknown_task_is_not_found() {
        let fx = Fixture::new();
        let id = TaskId::parse("20240101T120000.000000-rip").unwrap();
        assert!(matches!(
            fx.queue.resubmit(&id, Resubmission::unchanged()),
            Err(SpindleError::TaskNotFound { dir: QueueDir::Failed, .. })
        ));
    }

    #[test]
    fn cancel_with_downstream_cancels_whole_chain() {
        let fx = Fixture::new();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let insert = fx.queue.enqueue_one(insert_draft(&fx, "A.mp4")).unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let report = fx.queue.cancel(&failed.id, true).unwrap();
        assert_eq!(report.cancelled, vec![transcode.id.clone(), insert.id.clone()]);

        let store = fx.queue.store();
        assert!(store.list(QueueDir::Queued).unwrap().is_empty());
        assert!(store.list(QueueDir::Failed).unwrap().is_empty());
        assert!(fx.queue.index().read().unwrap().is_empty());
        let record = store.read(&insert.id, QueueDir::Complete).unwrap().unwrap();
        assert_eq!(record.outcome.map(|o| o.kind), Some(OutcomeKind::Cancelled));
    }

    #[test]
    fn cancel_without_downstream_leaves_dependents_queued() {
        let fx = Fixture::new();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let report = fx.queue.cancel(&failed.id, false).unwrap();
        assert!(report.cancelled.is_empty());
        assert!(fx.queue.store().contains(&transcode.id, QueueDir::Queued).unwrap());
    }

    #[test]
    fn downstream_lists_dependents_of_a_failed_task() {
        let fx = Fixture::new();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        let ids: Vec<_> = fx
            .queue
            .downstream(&failed.id)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![transcode.id]);
    }

    #[test]
    fn downstream_requires_a_failed_task() {
        let fx = Fixture::new();
        let (rip, _transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();

        assert!(matches!(
            fx.queue.downstream(&rip.id),
            Err(SpindleError::TaskNotFound { dir: QueueDir::Failed, .. })
        ));
    }

    fn queued_ids(fx: &Fixture) -> Vec<TaskId> {
        fx.queue.store().list(QueueDir::Queued).unwrap()
    }

    #[test]
    fn failed_replacement_write_keeps_the_original_consumer() {
        let (fx, faults) = Fixture::with_faults();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        // First queued write is the resubmitted rip, second the replacement.
        faults.fail_queued_write(2);
        let err = fx
            .queue
            .resubmit(&failed.id, Resubmission::unchanged().with_output(fx.media("A-v2.mkv")))
            .unwrap_err();
        assert!(matches!(err, SpindleError::Io { .. }));

        let store = fx.queue.store();
        assert_eq!(queued_ids(&fx), vec![transcode.id.clone()]);
        assert!(!store.contains(&transcode.id, QueueDir::Complete).unwrap());
        assert!(store.contains(&failed.id, QueueDir::Failed).unwrap());
        assert!(fx.queue.index().read().unwrap().contains(&transcode.id));
    }

    #[test]
    fn store_error_mid_cascade_rolls_back_so_a_retry_does_not_duplicate() {
        let (fx, faults) = Fixture::with_faults();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);
        let index_before = fx.queue.index().read().unwrap();

        faults.fault_complete_moves(Some(MoveFault::Io));
        let edits = Resubmission::unchanged().with_output(fx.media("A-v2.mkv"));
        assert!(fx.queue.resubmit(&failed.id, edits.clone()).is_err());

        assert_eq!(queued_ids(&fx), vec![transcode.id.clone()]);
        assert!(fx.queue.store().contains(&failed.id, QueueDir::Failed).unwrap());
        assert_eq!(fx.queue.index().read().unwrap(), index_before);

        faults.fault_complete_moves(None);
        let report = fx.queue.resubmit(&failed.id, edits).unwrap();
        let rips: Vec<_> = fx
            .queue
            .records_in(QueueDir::Queued)
            .unwrap()
            .into_iter()
            .filter(|r| r.task_type() == TaskType::Rip)
            .collect();
        assert_eq!(rips.len(), 1);
        assert_eq!(rips[0].id, report.task.id);
        assert_eq!(queued_ids(&fx).len(), 2);
    }

    #[test]
    fn failed_cancel_restores_the_failed_task() {
        let (fx, faults) = Fixture::with_faults();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        faults.fault_complete_moves(Some(MoveFault::Io));
        assert!(fx.queue.cancel(&failed.id, true).is_err());
        assert!(fx.queue.store().contains(&failed.id, QueueDir::Failed).unwrap());
        assert_eq!(queued_ids(&fx), vec![transcode.id]);
    }

    #[test]
    fn consumer_claimed_during_resubmit_is_left_alone() {
        let (fx, faults) = Fixture::with_faults();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        faults.fault_complete_moves(Some(MoveFault::AlreadyTaken));
        let report = fx
            .queue
            .resubmit(&failed.id, Resubmission::unchanged().with_output(fx.media("A-v2.mkv")))
            .unwrap();

        assert!(report.cancelled.is_empty());
        assert!(report.replacements.is_empty());
        let mut expected = vec![transcode.id.clone(), report.task.id.clone()];
        expected.sort();
        assert_eq!(queued_ids(&fx), expected);
        assert!(!fx.queue.store().contains(&transcode.id, QueueDir::Complete).unwrap());
        assert_eq!(
            fx.queue.index().read().unwrap(),
            vec![transcode.id.clone(), report.task.id.clone()]
        );
    }

    #[test]
    fn consumer_claimed_during_cancel_keeps_its_slot() {
        let (fx, faults) = Fixture::with_faults();
        let (_rip, transcode) = fx
            .queue
            .enqueue_process(rip_payload(1), fx.media("A.mkv"), transcode_payload(), fx.media("A.mp4"))
            .unwrap();
        let failed = fail_next(&fx, &[TaskType::Rip]);

        faults.fault_complete_moves(Some(MoveFault::AlreadyTaken));
        let report = fx.queue.cancel(&failed.id, true).unwrap();
        assert!(report.cancelled.is_empty());
        assert_eq!(fx.queue.index().read().unwrap(), vec![transcode.id]);
        assert!(!fx.queue.store().contains(&failed.id, QueueDir::Failed).unwrap());
    }

    #[test]
    fn requeue_returns_stuck_task_to_queued() {
        let fx = Fixture::new();
        fx.queue
            .enqueue_one(TaskDraft::new(TaskPayload::Rip(rip_payload(1))))
            .unwrap();
        let claimed = fx.queue.claim_next(&[TaskType::Rip]).unwrap().unwrap();
        fx.queue
            .index()
            .update(|order| {
                order.retain(|x| x != &claimed.id);
                Ok(())
            })
            .unwrap();

        let requeued = fx.queue.requeue(&claimed.id).unwrap();
        assert_eq!(requeued.claimed_at, None);
        assert!(fx.queue.store().contains(&claimed.id, QueueDir::Queued).unwrap());
        assert_eq!(fx.queue.index().read().unwrap(), vec![claimed.id.clone()]);

        let again = fx.queue.claim_next(&[TaskType::Rip]).unwrap().unwrap();
        assert_eq!(again.id, claimed.id);
    }

    #[test]
    fn prioritize_requires_a_queued_task() {
        let fx = Fixture::new();
        let a = fx
            .queue
            .enqueue_one(TaskDraft::new(TaskPayload::Rip(rip_payload(1))))
            .unwrap();
        let b = fx
            .queue
            .enqueue_one(TaskDraft::new(TaskPayload::Rip(rip_payload(2))))
            .unwrap();

        fx.queue.prioritize(&b.id).unwrap();
        assert_eq!(fx.queue.index().read().unwrap(), vec![b.id.clone(), a.id.clone()]);

        fx.queue.claim_next(&[TaskType::Rip]).unwrap();
        assert!(matches!(
            fx.queue.prioritize(&b.id),
            Err(SpindleError::TaskNotFound { dir: QueueDir::Queued, .. })
        ));
    }
}
