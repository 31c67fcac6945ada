//! Ordering Index: `tasks.json`, a JSON array of task ids.
//!
//! Position is priority (index 0 is claimed first). Readers never lock and
//! may see a slightly old list; every mutation goes through [`OrderingIndex::update`],
//! which holds the index lock across read-modify-write.
//!
//! Entries for tasks that already left `queued` are tolerated; claimers
//! filter them out, and the GC loop compacts them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use super::lock::{IndexLock, LockOptions};
use crate::domain::TaskId;
use crate::error::{Result, SpindleError};
use crate::impls::fs_store::write_json_atomic;

pub const INDEX_FILE: &str = "tasks.json";
pub const LOCK_FILE: &str = "tasks.json.lock";

pub struct OrderingIndex {
    path: PathBuf,
    lock_path: PathBuf,
    lock_options: LockOptions,
}

impl OrderingIndex {
    pub fn new(tasks_dir: &Path, lock_options: LockOptions) -> Self {
        Self {
            path: tasks_dir.join(INDEX_FILE),
            lock_path: tasks_dir.join(LOCK_FILE),
            lock_options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current order. A missing file is an empty index.
    pub fn read(&self) -> Result<Vec<TaskId>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SpindleError::io(&self.path, e)),
        };
        let entries: Vec<Value> =
            serde_json::from_slice(&bytes).map_err(|source| SpindleError::MalformedRecord {
                path: self.path.clone(),
                source,
            })?;

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_str().map(TaskId::parse) {
                Some(Ok(id)) => ids.push(id),
                _ => warn!(path = %self.path.display(), %entry, "dropping unparseable index entry"),
            }
        }
        Ok(ids)
    }

    /// Take the index lock. Hold the guard to batch several store writes
    /// and one index write into a single critical section.
    pub fn lock(&self) -> Result<IndexLock> {
        IndexLock::acquire(&self.lock_path, &self.lock_options)
    }

    /// Replace the index. Requires the guard from [`OrderingIndex::lock`].
    pub fn write_locked(&self, _guard: &IndexLock, ids: &[TaskId]) -> Result<()> {
        write_json_atomic(&self.path, ids)
    }

    /// Locked read-modify-write. The file is rewritten only if `f` succeeds.
    pub fn update<T>(&self, f: impl FnOnce(&mut Vec<TaskId>) -> Result<T>) -> Result<T> {
        let guard = self.lock()?;
        let mut ids = self.read()?;
        let out = f(&mut ids)?;
        self.write_locked(&guard, &ids)?;
        Ok(out)
    }
}

pub(crate) fn append_missing(ids: &mut Vec<TaskId>, new_ids: &[TaskId]) {
    for id in new_ids {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
}

pub(crate) fn move_to_front(ids: &mut Vec<TaskId>, id: &TaskId) -> bool {
    let present = ids.iter().position(|x| x == id).map(|pos| ids.remove(pos));
    ids.insert(0, id.clone());
    present.is_some()
}

/// Put `new` where `old` sat; append when `old` is gone.
pub(crate) fn replace_entry(ids: &mut Vec<TaskId>, old: &TaskId, new: TaskId) {
    match ids.iter().position(|x| x == old) {
        Some(pos) => ids[pos] = new,
        None => ids.push(new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskType;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn id(sec: u32, task_type: TaskType) -> TaskId {
        TaskId::from_parts(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, sec).unwrap(), task_type)
    }

    fn append(index: &OrderingIndex, new_ids: &[TaskId]) {
        index
            .update(|ids| {
                append_missing(ids, new_ids);
                Ok(())
            })
            .unwrap();
    }

    fn index() -> (TempDir, OrderingIndex) {
        let tmp = TempDir::new().unwrap();
        let index = OrderingIndex::new(tmp.path(), LockOptions::default());
        (tmp, index)
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (_tmp, index) = index();
        assert!(index.read().unwrap().is_empty());
    }

    #[test]
    fn append_preserves_order_and_skips_duplicates() {
        let (tmp, index) = index();
        let a = id(1, TaskType::Rip);
        let b = id(2, TaskType::Transcode);
        append(&index, &[a.clone(), b.clone()]);
        append(&index, &[a.clone()]);

        assert_eq!(index.read().unwrap(), vec![a, b]);
        assert!(!tmp.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn file_is_a_plain_json_array_of_ids() {
        let (tmp, index) = index();
        append(&index, &[id(1, TaskType::Rip)]);
        let raw: Vec<String> =
            serde_json::from_slice(&fs::read(tmp.path().join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(raw, vec!["20240101T120001.000000-rip".to_string()]);
    }

    #[test]
    fn unparseable_entries_are_dropped() {
        let (tmp, index) = index();
        fs::write(
            tmp.path().join(INDEX_FILE),
            r#"["20240101T120001.000000-rip", "bogus", 42]"#,
        )
        .unwrap();
        assert_eq!(index.read().unwrap(), vec![id(1, TaskType::Rip)]);
    }

    #[test]
    fn move_to_front_reports_whether_id_was_present() {
        let (_tmp, index) = index();
        let (a, b, c) = (id(1, TaskType::Rip), id(2, TaskType::Rip), id(3, TaskType::Rip));
        append(&index, &[a.clone(), b.clone()]);

        assert!(index.update(|ids| Ok(move_to_front(ids, &b))).unwrap());
        assert!(!index.update(|ids| Ok(move_to_front(ids, &c))).unwrap());
        assert_eq!(index.read().unwrap(), vec![c, b, a]);
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let (_tmp, index) = index();
        let a = id(1, TaskType::Rip);
        append(&index, &[a.clone()]);

        let result: Result<()> = index.update(|ids| {
            ids.clear();
            Err(SpindleError::Task("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(index.read().unwrap(), vec![a]);
    }

    #[test]
    fn replace_entry_keeps_position() {
        let (a, b, c, d) = (
            id(1, TaskType::Rip),
            id(2, TaskType::Transcode),
            id(3, TaskType::Rip),
            id(4, TaskType::Transcode),
        );
        let mut ids = vec![a.clone(), b.clone(), c.clone()];
        replace_entry(&mut ids, &b, d.clone());
        assert_eq!(ids, vec![a.clone(), d.clone(), c.clone()]);

        let e = id(5, TaskType::Insert);
        replace_entry(&mut ids, &b, e.clone());
        assert_eq!(ids, vec![a, d, c, e]);
    }
}
