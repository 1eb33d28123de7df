//! Per-task advisory filesystem lock.
//!
//! Writers to a task's state document serialize on a `.lock` file created
//! with `O_CREAT|O_EXCL`. Locks left behind by dead processes are broken
//! after a staleness window.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};

/// How long to keep retrying acquisition before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
/// Poll interval between acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);
/// Locks older than this are assumed to belong to a dead writer.
const STALE_AFTER: Duration = Duration::from_secs(30);

/// Held advisory lock; released on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    /// Acquire the lock file at `path`, retrying briefly on contention.
    pub async fn acquire(path: &Path) -> DomainResult<Self> {
        let deadline = std::time::Instant::now() + ACQUIRE_TIMEOUT;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path) {
                        warn!(lock = %path.display(), "breaking stale state lock");
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    if std::time::Instant::now() >= deadline {
                        return Err(DomainError::State(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    sleep(RETRY_INTERVAL).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > STALE_AFTER)
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
