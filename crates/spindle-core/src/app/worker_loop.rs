//! WorkerLoop - a processor's fixed-interval polling loop.
//!
//! One iteration (`tick`):
//! 1. claim the first ready task of the owned types
//! 2. run its handler, forwarding progress
//! 3. verify the declared output exists
//! 4. write the terminal outcome
//!
//! then sleep for the poll interval. At most one task runs per iteration
//! and the sleep is the only suspension point between tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::progress::ProgressReporter;
use crate::domain::{Processor, TaskId, TaskRecord};
use crate::error::{Result, SpindleError};
use crate::queue::TaskQueue;
use crate::runtime::Runtime;
use crate::util::blocking;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing ready.
    Idle,
    Completed(TaskId),
    Failed(TaskId),
}

pub struct WorkerLoop {
    processor: Processor,
    queue: Arc<TaskQueue>,
    runtime: Arc<Runtime>,
    progress: ProgressReporter,
    poll_interval: Duration,
}

impl WorkerLoop {
    pub fn new(
        processor: Processor,
        queue: Arc<TaskQueue>,
        runtime: Arc<Runtime>,
        progress: ProgressReporter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            processor,
            queue,
            runtime,
            progress,
            poll_interval,
        }
    }

    pub fn processor(&self) -> Processor {
        self.processor
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Run one poll iteration.
    ///
    /// A handler error is a normal `Tick::Failed`; only store errors are
    /// returned as `Err`.
    pub async fn tick(&self) -> Result<Tick> {
        let owned = self.processor.owned_types();
        let queue = Arc::clone(&self.queue);
        let Some(task) = blocking(move || queue.claim_next(&owned)).await? else {
            return Ok(Tick::Idle);
        };

        let id = task.id.clone();
        let progress = self.progress.for_task(&id);
        info!(task_id = %id, "executing task");
        let result = self
            .runtime
            .execute(&task, &progress)
            .await
            .and_then(|()| verify_output(&task));

        let queue = Arc::clone(&self.queue);
        match result {
            Ok(()) => {
                blocking(move || queue.complete(task)).await?;
                Ok(Tick::Completed(id))
            }
            Err(e) => {
                let reason = e.to_string();
                blocking(move || queue.fail(task, reason)).await?;
                Ok(Tick::Failed(id))
            }
        }
    }

    /// Poll until `shutdown` flips to true (or its sender goes away).
    ///
    /// An in-flight task always finishes before shutdown is observed.
    /// Returns `Err` only for unrecoverable store errors.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(processor = %self.processor, interval_ms = self.poll_interval.as_millis() as u64, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.tick().await {
                Ok(Tick::Idle) => debug!("nothing ready"),
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(processor = %self.processor, error = %e, "unrecoverable store error; stopping");
                    return Err(e);
                }
                Err(e) => warn!(processor = %self.processor, error = %e, "poll iteration failed; retrying next poll"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!(processor = %self.processor, "worker stopped");
        Ok(())
    }
}

/// A handler that reports success without producing its declared output
/// would leave dependents waiting forever.
fn verify_output(task: &TaskRecord) -> Result<()> {
    let Some(output) = task.output.as_deref() else {
        return Ok(());
    };
    match output.try_exists() {
        Ok(true) => Ok(()),
        Ok(false) => Err(SpindleError::Task(format!(
            "declared output {} was not produced",
            output.display()
        ))),
        Err(e) => Err(SpindleError::io(output, e)),
    }
}
