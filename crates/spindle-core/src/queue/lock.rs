//! Scoped exclusive lock around Ordering Index mutation.
//!
//! The lock is a sibling file created with create-new semantics. Whoever
//! creates it owns it until the guard drops. A lock file older than
//! `stale_after` is assumed to belong to a crashed owner and is broken.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::{Result, SpindleError};

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Give up acquiring after this long.
    pub timeout: Duration,
    /// Break a lock file whose mtime is older than this.
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(60),
        }
    }
}

/// Contents of the lock file, for operators inspecting a stuck lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held lock; removes the lock file on drop.
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    pub fn acquire(path: &Path, options: &LockOptions) -> Result<Self> {
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    let lock = Self {
                        path: path.to_path_buf(),
                    };
                    // Dropping `lock` on a failed write releases the file again.
                    serde_json::to_writer(&mut file, &info)?;
                    file.flush().map_err(|e| SpindleError::io(path, e))?;
                    debug!(path = %path.display(), "index lock acquired");
                    return Ok(lock);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if break_if_stale(path, options.stale_after)? {
                        continue;
                    }
                }
                Err(e) => return Err(SpindleError::io(path, e)),
            }

            let waited = started.elapsed();
            if waited >= options.timeout {
                return Err(SpindleError::LockTimeout {
                    path: path.to_path_buf(),
                    waited,
                });
            }

            let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
            thread::sleep(backoff + Duration::from_millis(jitter));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "index lock released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "index lock vanished before release");
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to release index lock"),
        }
    }
}

/// What a lock file looked like when we judged it.
#[derive(Debug, PartialEq, Eq)]
struct LockSnapshot {
    modified: SystemTime,
    contents: Vec<u8>,
}

impl LockSnapshot {
    fn take(path: &Path) -> io::Result<Self> {
        let modified = fs::metadata(path)?.modified()?;
        let contents = fs::read(path)?;
        Ok(Self { modified, contents })
    }
}

/// Returns true when a stale lock was removed and acquisition should retry.
fn break_if_stale(path: &Path, stale_after: Duration) -> Result<bool> {
    let judged = match LockSnapshot::take(path) {
        Ok(snapshot) => snapshot,
        // Released between our create attempt and now.
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(SpindleError::io(path, e)),
    };
    // A timestamp in the future (clock skew) is never stale.
    let Ok(age) = judged.modified.elapsed() else {
        return Ok(false);
    };
    if age <= stale_after {
        return Ok(false);
    }

    let owner = serde_json::from_slice::<LockInfo>(&judged.contents).ok();
    warn!(
        path = %path.display(),
        age_secs = age.as_secs(),
        owner_pid = owner.as_ref().map(|o| o.pid),
        "breaking stale index lock"
    );
    break_lock(path, &judged)
}

/// Remove the lock at `path` only if it is still the one `judged` describes.
///
/// Rename first so only one breaker wins; the loser sees NotFound. Between
/// our check and the rename another breaker may have removed the stale file
/// and a new owner created a fresh one, so the file we took is compared
/// against the judged one and put back when they differ.
fn break_lock(path: &Path, judged: &LockSnapshot) -> Result<bool> {
    let tombstone = path.with_file_name(format!(".lock.{}.stale", Ulid::new()));
    match fs::rename(path, &tombstone) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(SpindleError::io(path, e)),
    }

    match LockSnapshot::take(&tombstone) {
        Ok(taken) if taken == *judged => {
            let _ = fs::remove_file(&tombstone);
            return Ok(true);
        }
        Ok(_) => {}
        Err(e) => return Err(SpindleError::io(&tombstone, e)),
    }

    warn!(path = %path.display(), "index lock was re-acquired before it could be broken; restoring");
    // hard_link never clobbers a lock someone created in the meantime.
    match fs::hard_link(&tombstone, path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            warn!(path = %path.display(), "index lock recreated while restoring; the displaced owner is unprotected");
        }
        Err(e) => return Err(SpindleError::io(path, e)),
    }
    let _ = fs::remove_file(&tombstone);
    Ok(false)
}
