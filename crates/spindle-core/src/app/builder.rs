//! ProcessorBuilder - wires handlers into a processor's worker loop.
//!
//! Fail-fast: `build()` refuses a processor that could claim a task type it
//! has no handler for, or that was handed a type another processor owns.

use std::sync::Arc;
use std::time::Duration;

use crate::app::progress::ProgressReporter;
use crate::app::worker_loop::WorkerLoop;
use crate::domain::{Processor, TaskType};
use crate::error::SpindleError;
use crate::queue::TaskQueue;
use crate::runtime::{HandlerRegistry, Runtime, TaskHandler};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// # Example
/// ```ignore
/// let worker = ProcessorBuilder::new(Processor::Ripper)
///     .register(TaskType::Scan, scan_handler)?
///     .register(TaskType::Rip, rip_handler)?
///     .poll_interval(Duration::from_secs(2))
///     .build(queue)?;
/// ```
pub struct ProcessorBuilder {
    processor: Processor,
    registry: HandlerRegistry,
    poll_interval: Duration,
    progress: ProgressReporter,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing handlers for task types {0:?}; processor would claim tasks it cannot run")]
    MissingTaskTypes(Vec<TaskType>),

    #[error("task type {task_type} is owned by {owner}, not {processor}")]
    ForeignTaskType {
        task_type: TaskType,
        owner: Processor,
        processor: Processor,
    },

    #[error(transparent)]
    Registry(#[from] SpindleError),
}

impl ProcessorBuilder {
    pub fn new(processor: Processor) -> Self {
        Self {
            processor,
            registry: HandlerRegistry::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress: ProgressReporter::default(),
        }
    }

    pub fn register(
        mut self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Self, BuildError> {
        if !self.processor.owns(task_type) {
            return Err(BuildError::ForeignTaskType {
                task_type,
                owner: task_type.owner(),
                processor: self.processor,
            });
        }
        self.registry.register(task_type, handler)?;
        Ok(self)
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Share a reporter (e.g. one the caller already subscribed to).
    pub fn progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self, queue: Arc<TaskQueue>) -> Result<WorkerLoop, BuildError> {
        let missing: Vec<TaskType> = self
            .processor
            .owned_types()
            .into_iter()
            .filter(|t| !self.registry.contains(*t))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingTaskTypes(missing));
        }

        Ok(WorkerLoop::new(
            self.processor,
            queue,
            Arc::new(Runtime::new(Arc::new(self.registry))),
            self.progress,
            self.poll_interval,
        ))
    }
}
