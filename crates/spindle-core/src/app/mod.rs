//! App layer: processors and housekeeping built on the queue.
//!
//! - **ProcessorBuilder**: wires handlers into a processor's worker loop
//! - **WorkerLoop**: poll, claim, execute, record the outcome
//! - **ReaperLoop**: reports tasks stuck in `in_progress`
//! - **GcLoop**: retention purge and index compaction
//! - **status**: read-only snapshot for operators

pub mod builder;
pub mod gc_loop;
pub mod progress;
pub mod reaper_loop;
pub mod status;
pub mod worker_loop;

pub use self::builder::{BuildError, ProcessorBuilder};
pub use self::gc_loop::{GcLoop, GcReport};
pub use self::progress::{ProgressReporter, TaskProgress};
pub use self::reaper_loop::{ReaperLoop, StaleTask};
pub use self::status::{QueueCounts, QueueSnapshot, TaskView};
pub use self::worker_loop::{Tick, WorkerLoop};
