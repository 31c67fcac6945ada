use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{QueueDir, TaskType};

#[derive(Debug, Error)]
pub enum SpindleError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed task record at {path}: {source}")]
    MalformedRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("task {id} not found in {dir}")]
    TaskNotFound { id: String, dir: QueueDir },

    #[error("timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("payload of type {found} cannot replace a {expected} task")]
    PayloadTypeMismatch { expected: TaskType, found: TaskType },

    #[error("handler not found for task_type={0}")]
    HandlerNotFound(TaskType),

    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(TaskType),

    #[error("config error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("task join error: {0}")]
    TaskJoin(String),

    /// Reported by a handler; recorded as a normal failed outcome.
    #[error("{0}")]
    Task(String),
}

impl SpindleError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors after which continuing would silently drop work.
    pub fn is_fatal(&self) -> bool {
        match self {
            SpindleError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::StorageFull
                    | io::ErrorKind::ReadOnlyFilesystem
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SpindleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_fatal() {
        let err = SpindleError::io(
            "/tasks/queued",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn not_found_and_lock_timeout_are_not_fatal() {
        let err = SpindleError::io("/tasks/queued", io::Error::from(io::ErrorKind::NotFound));
        assert!(!err.is_fatal());

        let err = SpindleError::LockTimeout {
            path: PathBuf::from("/tasks/tasks.json.lock"),
            waited: Duration::from_secs(5),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn error_display() {
        let err = SpindleError::TaskNotFound {
            id: "20240101T120000.000001-rip".to_string(),
            dir: QueueDir::Failed,
        };
        assert_eq!(
            err.to_string(),
            "task 20240101T120000.000001-rip not found in failed"
        );
        assert_eq!(SpindleError::Task("codec not supported".into()).to_string(), "codec not supported");
    }
}
