//! Dependency resolution by file existence.
//!
//! There is no stored graph. An edge exists only because one task's
//! `output` string equals another's `input` string:
//! - Forward: a task is ready once a file exists at its `input`.
//! - Reverse: the tasks downstream of an output are found by scanning
//!   queued records for `input == output`.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::{TaskId, TaskRecord};

/// Whether `record` may be claimed now.
///
/// Existence only: no content, size or completeness check, and no caching.
pub fn is_ready(record: &TaskRecord) -> bool {
    let Some(input) = record.input.as_deref() else {
        return true;
    };
    match input.try_exists() {
        Ok(exists) => exists,
        Err(e) => {
            debug!(task_id = %record.id, input = %input.display(), error = %e, "input probe failed; not ready");
            false
        }
    }
}

/// Every queued task transitively fed by `output`, breadth-first.
///
/// Each queued task is visited at most once, so the walk terminates even
/// if records form a loop (`a.output == b.input`, `b.output == a.input`).
pub fn downstream_of<'a>(output: &Path, queued: &'a [TaskRecord]) -> Vec<&'a TaskRecord> {
    let mut seen: HashSet<&TaskId> = HashSet::new();
    let mut frontier: VecDeque<PathBuf> = VecDeque::from([output.to_path_buf()]);
    let mut found = Vec::new();

    while let Some(path) = frontier.pop_front() {
        for record in queued.iter().filter(|r| r.consumes(&path)) {
            if !seen.insert(&record.id) {
                continue;
            }
            found.push(record);
            if let Some(next) = &record.output {
                frontier.push_back(next.clone());
            }
        }
    }
    found
}

/// Queued tasks that read `output` directly (one level).
pub fn direct_consumers<'a>(output: &Path, queued: &'a [TaskRecord]) -> Vec<&'a TaskRecord> {
    queued.iter().filter(|r| r.consumes(output)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        InsertPayload, ScanPayload, TaskDraft, TaskPayload, TaskType, TranscodePayload,
    };
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn record(seq: u32, payload: TaskPayload, input: Option<&Path>, output: Option<&str>) -> TaskRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, seq).unwrap();
        let task_type = payload.task_type();
        let mut draft = TaskDraft::new(payload);
        draft.input = input.map(Path::to_path_buf);
        draft.output = output.map(PathBuf::from);
        TaskRecord::from_draft(TaskId::from_parts(at, task_type), at, draft)
    }

    fn transcode(seq: u32, input: &str, output: &str) -> TaskRecord {
        record(
            seq,
            TaskPayload::Transcode(TranscodePayload { preset: "hq".into() }),
            Some(Path::new(input)),
            Some(output),
        )
    }

    fn insert(seq: u32, input: &str) -> TaskRecord {
        record(
            seq,
            TaskPayload::Insert(InsertPayload {
                title: "A".into(),
                year: None,
            }),
            Some(Path::new(input)),
            None,
        )
    }

    #[test]
    fn null_input_is_always_ready() {
        let r = record(1, TaskPayload::Scan(ScanPayload { device: "/dev/sr0".into() }), None, None);
        assert!(is_ready(&r));
    }

    #[test]
    fn ready_tracks_file_existence() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("A.mkv");
        let r = record(
            1,
            TaskPayload::Transcode(TranscodePayload { preset: "hq".into() }),
            Some(&input),
            Some("/i/A.mp4"),
        );

        assert!(!is_ready(&r));
        fs::write(&input, b"").unwrap();
        assert!(is_ready(&r));
        fs::remove_file(&input).unwrap();
        assert!(!is_ready(&r));
    }

    #[test]
    fn downstream_walks_chain_breadth_first() {
        let queued = vec![
            insert(3, "/i/A.mp4"),
            transcode(2, "/r/A.mkv", "/i/A.mp4"),
            transcode(4, "/r/B.mkv", "/i/B.mp4"),
        ];
        let found: Vec<_> = downstream_of(Path::new("/r/A.mkv"), &queued)
            .into_iter()
            .map(|r| r.task_type())
            .collect();
        assert_eq!(found, vec![TaskType::Transcode, TaskType::Insert]);
    }

    #[test]
    fn downstream_terminates_on_loops() {
        let queued = vec![transcode(1, "/x/a", "/x/b"), transcode(2, "/x/b", "/x/a")];
        let found = downstream_of(Path::new("/x/a"), &queued);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn unrelated_tasks_are_not_downstream() {
        let queued = vec![transcode(1, "/r/B.mkv", "/i/B.mp4")];
        assert!(downstream_of(Path::new("/r/A.mkv"), &queued).is_empty());
        assert!(direct_consumers(Path::new("/r/A.mkv"), &queued).is_empty());
    }
}
