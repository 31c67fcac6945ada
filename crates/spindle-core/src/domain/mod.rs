//! Domain model (ids, task types, records, outcomes, queue locations).

pub mod events;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;
pub mod task_type;

pub use events::ProgressEvent;
pub use ids::TaskId;
pub use outcome::{Outcome, OutcomeKind};
pub use state::QueueDir;
pub use task::{
    InsertPayload, RipPayload, ScanPayload, TaskDraft, TaskPayload, TaskRecord, TranscodePayload,
};
pub use task_type::{Processor, TaskType};
