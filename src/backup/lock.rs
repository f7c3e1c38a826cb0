use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use sysinfo::{Pid, System};
use tracing::warn;

use crate::error::{NoteguardError, NoteguardResult};

/// A lock file older than this is assumed left over from a crash, even if its
/// pid has since been reused
const STALE_LOCK_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// One backup-or-restore operation at a time
///
/// Clones share the same in-process lock. With a lock file configured, other
/// processes using the same file are excluded as well.
#[derive(Debug, Clone, Default)]
pub struct OperationLock {
    inner: Arc<Mutex<()>>,
    lock_file: Option<PathBuf>,
}

/// Held for the duration of one operation; releases everything on drop
#[derive(Debug)]
pub struct OperationGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    lock_file: Option<PathBuf>,
}

impl OperationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also exclude other processes through `path`
    pub fn with_lock_file(mut self, path: PathBuf) -> Self {
        self.lock_file = Some(path);
        self
    }

    /// Acquire without waiting
    ///
    /// Fails with [`NoteguardError::OperationInProgress`] when another
    /// operation holds the lock.
    pub fn try_acquire(&self) -> NoteguardResult<OperationGuard<'_>> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(NoteguardError::OperationInProgress),
            // A panicking holder already released the lock; the unit inside
            // carries no state to repair.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let lock_file = match &self.lock_file {
            Some(path) => {
                create_lock_file(path)?;
                Some(path.clone())
            }
            None => None,
        };

        Ok(OperationGuard {
            _guard: guard,
            lock_file,
        })
    }

    /// Whether an operation is running in this process
    pub fn is_held(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }
}

fn create_lock_file(path: &PathBuf) -> NoteguardResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    for attempt in 0..2 {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if attempt == 0 && is_stale(path) {
                    warn!(path = %path.display(), "removing stale operation lock");
                    let _ = fs::remove_file(path);
                    continue;
                }
                return Err(NoteguardError::OperationInProgress);
            }
            Err(e) => {
                return Err(NoteguardError::Io(format!(
                    "Failed to create lock file {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    Err(NoteguardError::OperationInProgress)
}

/// Pid recorded in a lock file, if it holds one
fn lock_owner(path: &PathBuf) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    System::new().refresh_process(Pid::from_u32(pid))
}

/// A lock is stale when its recorded owner has exited or it has outlived
/// [`STALE_LOCK_AGE`]
fn is_stale(path: &PathBuf) -> bool {
    if lock_owner(path).map_or(false, |pid| !process_alive(pid)) {
        return true;
    }

    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map_or(false, |age| age > STALE_LOCK_AGE)
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if let Some(path) = &self.lock_file {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove operation lock");
            }
        }
    }
}
