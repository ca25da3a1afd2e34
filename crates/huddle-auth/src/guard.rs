//! Single-flight guard for automatic re-authentication.
//!
//! At most one logical re-auth attempt may be active per guard lifetime.
//! Intra-process coordination uses an atomic flag; cross-process
//! coordination uses an exclusively-created marker file (`O_EXCL`), so the
//! check-and-set is atomic rather than read-then-write. The marker carries
//! a timestamp: a flag older than the staleness window is reclaimed, so a
//! crash mid-flow cannot permanently wedge the guard.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

/// Single-flight coordination for automatic re-authentication.
#[derive(Debug)]
pub struct ReauthGuard {
    path: PathBuf,
    stale_after: Duration,
    held: Arc<AtomicBool>,
}

impl ReauthGuard {
    /// Creates a guard persisting its flag at `path`. Flags older than
    /// `stale_after` are treated as leftovers from a crashed attempt.
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tries to acquire the guard.
    ///
    /// Returns `Ok(None)` if an attempt is already in flight (here or in
    /// another instance). The returned lease clears the flag on
    /// [`release`](ReauthLease::release) or on drop, whether or not the
    /// guarded attempt succeeded.
    pub fn acquire(&self) -> AuthResult<Option<ReauthLease>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("re-auth already in flight in this process");
            return Ok(None);
        }

        match self.try_create_flag() {
            Ok(true) => Ok(Some(self.lease())),
            Ok(false) => {
                self.held.store(false, Ordering::SeqCst);
                Ok(None)
            }
            Err(e) => {
                self.held.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Returns true if the persisted flag is currently set.
    pub fn is_flag_set(&self) -> bool {
        self.path.exists()
    }

    fn lease(&self) -> ReauthLease {
        ReauthLease {
            path: self.path.clone(),
            held: Arc::clone(&self.held),
            released: false,
        }
    }

    /// Creates the marker file exclusively. Returns `Ok(false)` if another
    /// live attempt holds it.
    fn try_create_flag(&self) -> AuthResult<bool> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::storage(format!("failed to create guard directory: {}", e))
            })?;
        }

        match self.write_flag_exclusive() {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !self.flag_is_stale() {
                    debug!("re-auth flag held by another instance");
                    return Ok(false);
                }
                warn!(path = %self.path.display(), "reclaiming stale re-auth flag");
                fs::remove_file(&self.path).map_err(|e| {
                    AuthError::storage(format!("failed to remove stale flag: {}", e))
                })?;
                match self.write_flag_exclusive() {
                    Ok(()) => Ok(true),
                    // Another instance won the reclaim race.
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
                    Err(e) => Err(AuthError::storage(format!(
                        "failed to create re-auth flag: {}",
                        e
                    ))),
                }
            }
            Err(e) => Err(AuthError::storage(format!(
                "failed to create re-auth flag: {}",
                e
            ))),
        }
    }

    fn write_flag_exclusive(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        writeln!(file, "{}", Utc::now().to_rfc3339())?;
        file.sync_all()
    }

    /// A flag with an unreadable or too-old timestamp counts as stale.
    fn flag_is_stale(&self) -> bool {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return true,
        };
        let written: DateTime<Utc> = match content.trim().parse() {
            Ok(t) => t,
            Err(_) => return true,
        };
        let age = Utc::now() - written;
        age.to_std().map(|age| age > self.stale_after).unwrap_or(false)
    }
}

/// Handle held for the duration of one guarded re-auth attempt.
#[derive(Debug)]
pub struct ReauthLease {
    path: PathBuf,
    held: Arc<AtomicBool>,
    released: bool,
}

impl ReauthLease {
    /// Releases the guard, clearing the flag unconditionally so a fresh
    /// attempt is possible on the next trigger.
    pub fn release(mut self) {
        self.clear();
    }

    /// Returns the flag path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn clear(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.held.store(false, Ordering::SeqCst);
        if self.path.exists()
            && let Err(e) = fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove re-auth flag");
        }
        debug!("re-auth guard released");
    }
}

impl Drop for ReauthLease {
    fn drop(&mut self) {
        self.clear();
    }
}
