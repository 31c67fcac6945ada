//! Shared utility functions.

use tokio::task::spawn_blocking;

use crate::error::{Result, SpindleError};

/// Run blocking queue/store work on the blocking pool.
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| SpindleError::TaskJoin(e.to_string()))?
}
