//! TaskStore port - durable, race-safe persistence of Task Records.
//!
//! The queue directories are the source of truth. Every operation here is
//! non-locking; callers must tolerate listings that are stale by the time
//! they act on them.

use crate::domain::{QueueDir, TaskId, TaskRecord};
use crate::error::Result;

/// Result of moving a record between directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// The source vanished first (a concurrent claimer or cascade won).
    AlreadyTaken,
}

/// TaskStore persists records as `{dir}/{id}.json`.
///
/// # Contract
/// - `write` never exposes a partially written file (temp + rename)
/// - `move_record` is the only concurrency primitive: exactly one of several
///   concurrent movers observes `Moved`
/// - I/O failures surface as store errors and are not retried here
pub trait TaskStore: Send + Sync {
    /// Create the queue directories if missing.
    fn ensure_layout(&self) -> Result<()>;

    fn write(&self, record: &TaskRecord, dir: QueueDir) -> Result<()>;

    /// `Ok(None)` when no such file exists. Unparseable JSON is
    /// `SpindleError::MalformedRecord`.
    fn read(&self, id: &TaskId, dir: QueueDir) -> Result<Option<TaskRecord>>;

    fn move_record(&self, id: &TaskId, from: QueueDir, to: QueueDir) -> Result<MoveOutcome>;

    /// Returns whether a file was removed.
    fn remove(&self, id: &TaskId, dir: QueueDir) -> Result<bool>;

    /// Ids present in `dir`, sorted ascending.
    fn list(&self, dir: QueueDir) -> Result<Vec<TaskId>>;

    fn contains(&self, id: &TaskId, dir: QueueDir) -> Result<bool>;
}
