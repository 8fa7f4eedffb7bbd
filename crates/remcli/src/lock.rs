//! Cross-process launch rights for a daemon endpoint.
//!
//! A launch right is the file `<socket>.lock` holding a JSON [`LockOwner`]
//! record. It is created atomically by hard-linking a fully written staging
//! file into place, so a reader never observes a half-written record from a
//! live holder.
//!
//! A holder that crashes leaves its file behind. Such a lock is stale when the
//! recorded pid is gone, or when it is older than the grace period. Inspection,
//! reclamation and release all run under an auxiliary `flock` on
//! `<socket>.lock.reclaim`: two clients can never both replace the same stale
//! record, and a holder whose lock was reclaimed never deletes its successor's.
//!
//! The `.reclaim` file is created on first use and never removed. Unlinking it
//! while another process is blocked on its `flock` would let a later process
//! lock a fresh inode, leaving two holders of the mutex. It stays empty and
//! is swept with the socket directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::EndpointDescriptor;

/// Grace period after which a held launch lock is considered abandoned.
///
/// Longer than the default readiness timeout, so a live launcher is never
/// robbed of its right while it is still waiting for the daemon. Releasing a
/// lock removes `<socket>.lock` but leaves the empty `<socket>.lock.reclaim`
/// mutex file in place.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(15);

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// I/O failure while working with the lock files.
#[derive(Debug, Error)]
#[error("launch lock {}: {source}", path.display())]
pub struct LockError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

impl LockError {
    fn new(path: &Path, source: io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Who holds a launch right and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    /// Process id of the holder.
    pub pid: u32,
    /// Unique per acquisition, so a release only removes its own record.
    pub token: String,
    /// Acquisition time in milliseconds since the Unix epoch.
    pub acquired_at_ms: u64,
}

impl LockOwner {
    fn current() -> Self {
        let pid = std::process::id();
        let acquired_at_ms = now_ms();
        let seq = TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            pid,
            token: format!("{pid}-{acquired_at_ms}-{seq}"),
            acquired_at_ms,
        }
    }

    /// Time elapsed since the lock was acquired.
    #[must_use]
    pub fn age(&self) -> Duration {
        Duration::from_millis(now_ms().saturating_sub(self.acquired_at_ms))
    }
}

/// Result of [`LaunchLock::try_acquire`].
#[derive(Debug)]
pub enum Acquisition {
    /// The caller now owns the launch right until the guard is released.
    Acquired(LaunchGuard),
    /// Another live process holds it. The owner is `None` when its record
    /// could not be read.
    AlreadyHeld(Option<LockOwner>),
}

#[derive(Debug)]
enum Holder {
    Vacant,
    Live(Option<LockOwner>),
    Stale(StaleReason),
}

#[derive(Debug)]
enum StaleReason {
    OwnerDead(u32),
    Expired(Duration),
    Unreadable(Duration),
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnerDead(pid) => write!(f, "owner pid {pid} is gone"),
            Self::Expired(age) => write!(f, "held for {age:?}"),
            Self::Unreadable(age) => write!(f, "unreadable record, {age:?} old"),
        }
    }
}

/// Launch-right arbiter for one endpoint.
#[derive(Debug, Clone)]
pub struct LaunchLock {
    path: PathBuf,
    stale_after: Duration,
}

impl LaunchLock {
    /// Arbiter using the lock file at `path`.
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    /// Arbiter for the lock file belonging to `endpoint`.
    #[must_use]
    pub fn for_endpoint(endpoint: &EndpointDescriptor, stale_after: Duration) -> Self {
        Self::new(endpoint.lock_path(), stale_after)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the launch right without blocking on its holder.
    ///
    /// A stale lock is reclaimed transparently; the reclamation is logged and
    /// never reported to the caller.
    ///
    /// # Errors
    /// Returns [`LockError`] if the lock directory or files cannot be used.
    pub fn try_acquire(&self) -> Result<Acquisition, LockError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LockError::new(parent, e))?;
        }
        if let Some(guard) = self.create()? {
            return Ok(Acquisition::Acquired(guard));
        }

        let _mutex = self.reclaim_mutex()?;
        match self.inspect()? {
            Holder::Live(owner) => Ok(Acquisition::AlreadyHeld(owner)),
            Holder::Vacant => self.create_or_held(),
            Holder::Stale(reason) => {
                tracing::warn!(lock = %self.path.display(), %reason, "Reclaiming stale launch lock");
                remove_if_present(&self.path).map_err(|e| LockError::new(&self.path, e))?;
                self.create_or_held()
            }
        }
    }

    fn create_or_held(&self) -> Result<Acquisition, LockError> {
        Ok(self
            .create()?
            .map_or(Acquisition::AlreadyHeld(None), Acquisition::Acquired))
    }

    /// Atomically create the lock file with a fresh owner record.
    ///
    /// Returns `None` if the file already exists.
    fn create(&self) -> Result<Option<LaunchGuard>, LockError> {
        let owner = LockOwner::current();
        let staging = self.sibling(&format!("{}.tmp", owner.token));
        write_record(&staging, &owner).map_err(|e| LockError::new(&staging, e))?;
        let linked = fs::hard_link(&staging, &self.path);
        if let Err(e) = fs::remove_file(&staging) {
            tracing::debug!(file = %staging.display(), error = %e, "Failed to remove staging file");
        }
        match linked {
            Ok(()) => {
                tracing::debug!(lock = %self.path.display(), token = %owner.token, "Launch lock acquired");
                Ok(Some(LaunchGuard {
                    lock: self.clone(),
                    owner,
                    released: false,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(LockError::new(&self.path, e)),
        }
    }

    fn inspect(&self) -> Result<Holder, LockError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Holder::Vacant),
            Err(e) => return Err(LockError::new(&self.path, e)),
        };
        if let Ok(owner) = serde_json::from_slice::<LockOwner>(&bytes) {
            let age = owner.age();
            return Ok(if !process_alive(owner.pid) {
                Holder::Stale(StaleReason::OwnerDead(owner.pid))
            } else if age > self.stale_after {
                Holder::Stale(StaleReason::Expired(age))
            } else {
                Holder::Live(Some(owner))
            });
        }
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Holder::Vacant),
            Err(e) => return Err(LockError::new(&self.path, e)),
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        Ok(if age > self.stale_after {
            Holder::Stale(StaleReason::Unreadable(age))
        } else {
            Holder::Live(None)
        })
    }

    fn reclaim_mutex(&self) -> Result<ReclaimMutex, LockError> {
        let path = self.sibling("reclaim");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::new(&path, e))?;
        fs2::FileExt::lock_exclusive(&file).map_err(|e| LockError::new(&path, e))?;
        Ok(ReclaimMutex { file })
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Exclusive `flock` held while a lock record is inspected or replaced.
struct ReclaimMutex {
    file: File,
}

impl Drop for ReclaimMutex {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Proof of owning a launch right. Releases it when dropped.
#[derive(Debug)]
pub struct LaunchGuard {
    lock: LaunchLock,
    owner: LockOwner,
    released: bool,
}

impl LaunchGuard {
    #[must_use]
    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Release the launch right now instead of on drop.
    ///
    /// # Errors
    /// Returns [`LockError`] if the lock file could not be removed.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_once()
    }

    fn release_once(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let _mutex = self.lock.reclaim_mutex()?;
        let path = &self.lock.path;
        let current = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<LockOwner>(&bytes).ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(LockError::new(path, e)),
        };
        if current.as_ref().is_some_and(|o| o.token == self.owner.token) {
            remove_if_present(path).map_err(|e| LockError::new(path, e))?;
            tracing::debug!(lock = %path.display(), "Launch lock released");
        } else {
            tracing::warn!(lock = %path.display(), "Launch lock was reclaimed by another process");
        }
        Ok(())
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_once() {
            tracing::warn!(error = %e, "Failed to release launch lock");
        }
    }
}

fn write_record(path: &Path, owner: &LockOwner) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&serde_json::to_vec(owner)?)?;
    file.sync_all()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Whether a process with `pid` exists. `EPERM` still means it exists.
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission checks.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
