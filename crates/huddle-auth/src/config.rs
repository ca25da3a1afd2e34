//! Authentication subsystem configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the authentication lifecycle.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Wait after discovering a missing resource token before starting a
    /// guarded re-auth, so a redirect-based consent flow still in progress
    /// can land first.
    pub grace_delay: Duration,

    /// Ceiling on how long a single identity change may keep the session
    /// in a loading state. When it fires, the state is forced to a
    /// conservative settled value; this is a failure-mode guard, not a
    /// correctness mechanism.
    pub settle_ceiling: Duration,

    /// Age beyond which a persisted re-auth flag is treated as a leftover
    /// from a crashed attempt and reclaimed.
    pub guard_stale_after: Duration,

    /// Where the delegated resource token is persisted.
    pub token_path: PathBuf,

    /// Where the re-auth single-flight flag lives.
    pub guard_path: PathBuf,

    /// Where the cross-instance session snapshot lives.
    pub snapshot_path: PathBuf,
}

impl AuthConfig {
    /// Default grace delay in milliseconds.
    pub const DEFAULT_GRACE_DELAY_MS: u64 = 2_000;

    /// Default settle ceiling in milliseconds.
    pub const DEFAULT_SETTLE_CEILING_MS: u64 = 10_000;

    /// Default guard staleness window in seconds.
    pub const DEFAULT_GUARD_STALE_SECS: u64 = 120;

    /// Creates a configuration with default timings and storage under the
    /// user's data directory.
    pub fn new() -> Self {
        let data_dir = default_data_dir();
        Self {
            grace_delay: Duration::from_millis(Self::DEFAULT_GRACE_DELAY_MS),
            settle_ceiling: Duration::from_millis(Self::DEFAULT_SETTLE_CEILING_MS),
            guard_stale_after: Duration::from_secs(Self::DEFAULT_GUARD_STALE_SECS),
            token_path: data_dir.join("resource-token.json"),
            guard_path: data_dir.join("reauth.flag"),
            snapshot_path: data_dir.join("session-snapshot.json"),
        }
    }

    /// Builder: set the grace delay.
    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    /// Builder: set the settle ceiling.
    pub fn with_settle_ceiling(mut self, ceiling: Duration) -> Self {
        self.settle_ceiling = ceiling;
        self
    }

    /// Builder: set the guard staleness window.
    pub fn with_guard_stale_after(mut self, window: Duration) -> Self {
        self.guard_stale_after = window;
        self
    }

    /// Builder: root all storage paths in the given directory.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.token_path = dir.join("resource-token.json");
        self.guard_path = dir.join("reauth.flag");
        self.snapshot_path = dir.join("session-snapshot.json");
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.settle_ceiling.is_zero() {
            return Err("settle ceiling must be non-zero".to_string());
        }
        if self.grace_delay >= self.settle_ceiling {
            return Err("grace delay must be shorter than the settle ceiling".to_string());
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the default data directory for huddle client state.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".local").join("share"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huddle")
}
