//! FsTaskStore - the queue directories on a local filesystem.
//!
//! Layout under `root`:
//! ```text
//! queued/{id}.json
//! in_progress/{id}.json
//! complete/{id}.json
//! failed/{id}.json
//! ```
//! Temporary files are dot-prefixed and never listed.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::domain::{QueueDir, TaskId, TaskRecord};
use crate::error::{Result, SpindleError};
use crate::ports::{MoveOutcome, TaskStore};

pub struct FsTaskStore {
    root: PathBuf,
}

impl FsTaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir_path(&self, dir: QueueDir) -> PathBuf {
        self.root.join(dir.dir_name())
    }

    pub fn record_path(&self, id: &TaskId, dir: QueueDir) -> PathBuf {
        self.dir_path(dir).join(id.file_name())
    }
}

impl TaskStore for FsTaskStore {
    fn ensure_layout(&self) -> Result<()> {
        for dir in QueueDir::ALL {
            let path = self.dir_path(dir);
            fs::create_dir_all(&path).map_err(|e| SpindleError::io(&path, e))?;
        }
        Ok(())
    }

    fn write(&self, record: &TaskRecord, dir: QueueDir) -> Result<()> {
        let path = self.record_path(&record.id, dir);
        write_json_atomic(&path, record)?;
        debug!(task_id = %record.id, %dir, "record written");
        Ok(())
    }

    fn read(&self, id: &TaskId, dir: QueueDir) -> Result<Option<TaskRecord>> {
        let path = self.record_path(id, dir);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SpindleError::io(&path, e)),
        };
        let record: TaskRecord = serde_json::from_slice(&bytes)
            .map_err(|source| SpindleError::MalformedRecord {
                path: path.clone(),
                source,
            })?;
        if record.id != *id || !record.is_consistent() {
            return Err(SpindleError::MalformedRecord {
                source: serde::de::Error::custom(format!(
                    "record id {} (type {}) does not match file name {}",
                    record.id,
                    record.task_type(),
                    id.file_name()
                )),
                path,
            });
        }
        Ok(Some(record))
    }

    fn move_record(&self, id: &TaskId, from: QueueDir, to: QueueDir) -> Result<MoveOutcome> {
        let source = self.record_path(id, from);
        let target = self.record_path(id, to);
        match fs::rename(&source, &target) {
            Ok(()) => {
                debug!(task_id = %id, %from, %to, "record moved");
                Ok(MoveOutcome::Moved)
            }
            // A missing target directory also reports NotFound; only a vanished
            // source means someone else got there first.
            Err(e) if e.kind() == io::ErrorKind::NotFound && !source.exists() => {
                debug!(task_id = %id, %from, %to, "record already taken");
                Ok(MoveOutcome::AlreadyTaken)
            }
            Err(e) => Err(SpindleError::io(&source, e)),
        }
    }

    fn remove(&self, id: &TaskId, dir: QueueDir) -> Result<bool> {
        let path = self.record_path(id, dir);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SpindleError::io(&path, e)),
        }
    }

    fn list(&self, dir: QueueDir) -> Result<Vec<TaskId>> {
        let dir_path = self.dir_path(dir);
        let entries = match fs::read_dir(&dir_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SpindleError::io(&dir_path, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SpindleError::io(&dir_path, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            match TaskId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring unrecognized file in queue directory"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn contains(&self, id: &TaskId, dir: QueueDir) -> Result<bool> {
        let path = self.record_path(id, dir);
        path.try_exists().map_err(|e| SpindleError::io(&path, e))
    }
}

/// Serialize `value` beside `path` and rename it into place.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{stem}.{}.tmp", Ulid::new()));

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(SpindleError::io(path, e));
    }
    Ok(())
}
