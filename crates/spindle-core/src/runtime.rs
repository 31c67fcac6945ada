use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::progress::TaskProgress;
use crate::domain::{TaskRecord, TaskType};
use crate::error::SpindleError;

/// A handler for a specific task type.
///
/// Gets the whole claimed record so it can read `input`, `output` and the
/// payload. A handler that promises an `output` must leave the file at that
/// path (written via temp-then-rename) before returning `Ok`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskRecord, progress: &TaskProgress) -> Result<(), SpindleError>;
}

/// Registry of handlers (task_type -> handler).
///
/// Built during initialization (mutable), used during runtime (immutable),
/// so no locks are needed.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), SpindleError> {
        if self.handlers.contains_key(&task_type) {
            return Err(SpindleError::DuplicateHandler(task_type));
        }
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type)
    }

    pub fn contains(&self, task_type: TaskType) -> bool {
        self.handlers.contains_key(&task_type)
    }
}

/// Runtime executes a claimed record by dispatching to its registered handler.
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub async fn execute(&self, task: &TaskRecord, progress: &TaskProgress) -> Result<(), SpindleError> {
        let task_type = task.task_type();
        let handler = self
            .registry
            .get(task_type)
            .ok_or(SpindleError::HandlerNotFound(task_type))?;

        handler.handle(task, progress).await
    }
}
