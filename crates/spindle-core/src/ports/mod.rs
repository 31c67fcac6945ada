//! Ports - seams between the queue logic and its environment.
//!
//! - TaskStore: the queue directories (filesystem implementation in `impls`)
//! - Clock: time source, swappable in tests
//! - IdGenerator: timestamp-based task ids

pub mod clock;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, TimestampIdGenerator};
pub use self::task_store::{MoveOutcome, TaskStore};
