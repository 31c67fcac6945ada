//! Queue module: the filesystem task queue.
//!
//! `TaskQueue` ties together the record store, the Ordering Index, the id
//! generator and the clock. Its operations are split by concern:
//! - creation (this file): transactional enqueue under the index lock
//! - [`claim`]: select and take the next ready task
//! - [`lifecycle`]: terminal outcomes
//! - [`cascade`]: resubmit / cancel / requeue / prioritize
//!
//! Every method is blocking; async callers go through `util::blocking`.

pub mod cascade;
pub mod claim;
pub mod dependency;
pub mod index;
pub mod lifecycle;
pub mod lock;

pub use cascade::{CancelReport, ResubmitReport, Resubmission};
pub use index::OrderingIndex;
pub use lock::{IndexLock, LockOptions};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{
    QueueDir, RipPayload, TaskDraft, TaskId, TaskPayload, TaskRecord, TranscodePayload,
};
use crate::error::{Result, SpindleError};
use crate::impls::FsTaskStore;
use crate::ports::{Clock, IdGenerator, SystemClock, TaskStore, TimestampIdGenerator};

pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    index: OrderingIndex,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl TaskQueue {
    pub fn new(
        store: Arc<dyn TaskStore>,
        index: OrderingIndex,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            index,
            ids,
            clock,
        }
    }

    /// Open (and lay out) a queue rooted at `tasks_dir` with the system clock.
    pub fn open(tasks_dir: &Path, lock_options: LockOptions) -> Result<Self> {
        Self::open_with_clock(tasks_dir, lock_options, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        tasks_dir: &Path,
        lock_options: LockOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = FsTaskStore::new(tasks_dir);
        store.ensure_layout()?;
        Ok(Self::new(
            Arc::new(store),
            OrderingIndex::new(tasks_dir, lock_options),
            Arc::new(TimestampIdGenerator::new(Arc::clone(&clock))),
            clock,
        ))
    }

    pub fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    pub fn index(&self) -> &OrderingIndex {
        &self.index
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Create every draft and append them to the index in one critical section.
    ///
    /// Records are written before the index so a crash in between leaves
    /// orphans in `queued` (re-appended by the GC reconcile) rather than
    /// index entries without records.
    pub fn enqueue(&self, drafts: Vec<TaskDraft>) -> Result<Vec<TaskRecord>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.index.lock()?;
        let mut order = self.index.read()?;

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let record = self.new_record(draft)?;
            self.store.write(&record, QueueDir::Queued)?;
            created.push(record);
        }
        let ids: Vec<TaskId> = created.iter().map(|r| r.id.clone()).collect();
        index::append_missing(&mut order, &ids);
        self.index.write_locked(&guard, &order)?;

        for record in &created {
            info!(task_id = %record.id, input = ?record.input, output = ?record.output, "task enqueued");
        }
        Ok(created)
    }

    pub fn enqueue_one(&self, draft: TaskDraft) -> Result<TaskRecord> {
        self.enqueue(vec![draft])?
            .pop()
            .ok_or_else(|| SpindleError::Task("enqueue returned no record".into()))
    }

    /// The "process" action: a rip and the transcode that consumes its output,
    /// created together.
    pub fn enqueue_process(
        &self,
        rip: RipPayload,
        ripped: impl Into<PathBuf>,
        transcode: TranscodePayload,
        transcoded: impl Into<PathBuf>,
    ) -> Result<(TaskRecord, TaskRecord)> {
        let ripped = ripped.into();
        let drafts = vec![
            TaskDraft::new(TaskPayload::Rip(rip)).with_output(ripped.clone()),
            TaskDraft::new(TaskPayload::Transcode(transcode))
                .with_input(ripped)
                .with_output(transcoded),
        ];
        let mut created = self.enqueue(drafts)?.into_iter();
        match (created.next(), created.next()) {
            (Some(rip), Some(transcode)) => Ok((rip, transcode)),
            _ => Err(SpindleError::Task("process pair was not fully created".into())),
        }
    }

    /// Directory currently holding `id`, checked in lifecycle order.
    ///
    /// A failed task also has a `complete` twin; `failed` is reported.
    pub fn locate(&self, id: &TaskId) -> Result<Option<QueueDir>> {
        for dir in [
            QueueDir::Queued,
            QueueDir::InProgress,
            QueueDir::Failed,
            QueueDir::Complete,
        ] {
            if self.store.contains(id, dir)? {
                return Ok(Some(dir));
            }
        }
        Ok(None)
    }

    /// Find `id` wherever it lives.
    pub fn find(&self, id: &TaskId) -> Result<Option<(QueueDir, TaskRecord)>> {
        let Some(dir) = self.locate(id)? else {
            return Ok(None);
        };
        Ok(self.store.read(id, dir)?.map(|record| (dir, record)))
    }

    /// Every readable record in `dir`, sorted by id. Malformed or vanished
    /// files are skipped.
    pub fn records_in(&self, dir: QueueDir) -> Result<Vec<TaskRecord>> {
        let mut records = Vec::new();
        for id in self.store.list(dir)? {
            match self.store.read(&id, dir) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(SpindleError::MalformedRecord { path, source }) => {
                    warn!(path = %path.display(), error = %source, "skipping malformed record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// Assign a fresh id that no queue directory already holds.
    fn new_record(&self, draft: TaskDraft) -> Result<TaskRecord> {
        let task_type = draft.task_type();
        loop {
            let id = self.ids.generate(task_type);
            if self.locate(&id)?.is_none() {
                return Ok(TaskRecord::from_draft(id, self.clock.now(), draft));
            }
            warn!(task_id = %id, "generated id already in use; regenerating");
        }
    }
}
