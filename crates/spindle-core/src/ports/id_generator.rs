//! IdGenerator port - task id generation.
//!
//! Ids embed their creation time, so generation reads the Clock. Two ids of
//! the same type asked for within one microsecond would collide; the
//! generator therefore never hands out a timestamp at or before the last one
//! it issued.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::domain::{TaskId, TaskType};
use crate::ports::Clock;

/// IdGenerator creates task ids.
///
/// # Thread Safety
/// - `Send + Sync` (shared by every creator in the process)
pub trait IdGenerator: Send + Sync {
    fn generate(&self, task_type: TaskType) -> TaskId;
}

/// Monotonic, microsecond-resolution timestamp ids.
pub struct TimestampIdGenerator<C> {
    clock: C,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl<C: Clock> TimestampIdGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }
}

impl<C: Clock> IdGenerator for TimestampIdGenerator<C> {
    fn generate(&self, task_type: TaskType) -> TaskId {
        let now = self.clock.now();
        let mut at = now
            .with_nanosecond(now.nanosecond() / 1_000 * 1_000)
            .unwrap_or(now);

        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last
            && at <= prev
        {
            at = prev + Duration::microseconds(1);
        }
        *last = Some(at);

        TaskId::from_parts(at, task_type)
    }
}
