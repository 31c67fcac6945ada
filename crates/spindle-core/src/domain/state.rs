//! QueueDir - where a Task Record currently lives.
//!
//! There is no stored status field: a record's state is the directory that
//! holds it.
//!
//! - queued -> in_progress: claim (atomic rename, exactly one winner)
//! - in_progress -> complete: terminal outcome (success, failure)
//! - in_progress -> complete + failed: failure also flags for human review
//! - queued -> complete: cancelled by a cascade

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueDir {
    Queued,
    InProgress,
    Complete,
    Failed,
}

impl QueueDir {
    pub const ALL: [QueueDir; 4] = [
        QueueDir::Queued,
        QueueDir::InProgress,
        QueueDir::Complete,
        QueueDir::Failed,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            QueueDir::Queued => "queued",
            QueueDir::InProgress => "in_progress",
            QueueDir::Complete => "complete",
            QueueDir::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_names_match_layout() {
        let names: Vec<_> = QueueDir::ALL.iter().map(|d| d.dir_name()).collect();
        assert_eq!(names, ["queued", "in_progress", "complete", "failed"]);
    }
}
