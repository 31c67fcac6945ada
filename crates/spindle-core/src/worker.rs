use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

use crate::app::worker_loop::WorkerLoop;
use crate::error::{Result, SpindleError};

/// Worker group handle.
/// - `request_shutdown()` stops every worker after its current task
/// - a worker that hits an unrecoverable error stops the whole group
/// - `shutdown_and_join()` waits for all workers and reports the first error
pub struct WorkerGroup {
    shutdown_tx: Arc<watch::Sender<bool>>,
    joins: Vec<JoinHandle<Result<()>>>,
}

impl WorkerGroup {
    /// Spawn `n` concurrent runs of `worker`.
    ///
    /// They share one queue, so concurrent claims are settled by the
    /// queue's atomic move like any other pair of claimers.
    pub fn spawn(n: usize, worker: Arc<WorkerLoop>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let w = Arc::clone(&worker);
            let rx = shutdown_tx.subscribe();
            let tx = Arc::clone(&shutdown_tx);
            let span = info_span!("worker", processor = %w.processor(), worker_id);

            let join = tokio::spawn(
                async move {
                    let result = w.run(rx).await;
                    if result.is_err() {
                        tx.send_replace(true);
                    }
                    result
                }
                .instrument(span),
            );
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// A receiver that flips to true when the group is shutting down.
    /// Background loops (reaper, gc) can follow the group with it.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown for all workers.
    /// In-flight tasks are not interrupted; workers just stop claiming.
    pub fn request_shutdown(&self) {
        // send_replace stores the flag even when no receiver is alive yet
        self.shutdown_tx.send_replace(true);
    }

    /// Resolves once shutdown was requested or a worker stopped the group.
    pub async fn stopped(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) -> Result<()> {
        self.request_shutdown();
        let mut first_error = None;
        for join in self.joins {
            let outcome = match join.await {
                Ok(result) => result,
                Err(e) => Err(SpindleError::TaskJoin(e.to_string())),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
