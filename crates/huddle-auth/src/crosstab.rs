//! Cross-instance session resync.
//!
//! Every client instance writes its settled authentication snapshot to a
//! shared file and watches that file for writes made by other instances.
//! A foreign change means another instance signed in or out; the local
//! instance is expected to perform a full reload rather than merge state,
//! so the watcher only reports the event and leaves the reaction to the
//! embedding application.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_core::SessionSnapshot;

use crate::error::{AuthError, AuthResult};

/// Reads and writes the shared authentication snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    origin: Uuid,
}

impl SnapshotStore {
    /// Creates a store writing as the given instance.
    pub fn new(path: impl Into<PathBuf>, origin: Uuid) -> Self {
        Self {
            path: path.into(),
            origin,
        }
    }

    /// Creates a store with a fresh per-instance origin id.
    pub fn with_new_origin(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Uuid::new_v4())
    }

    /// This instance's origin id.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// The shared snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the snapshot for the given settled state.
    pub fn write(&self, is_authenticated: bool, has_oauth_token: bool) -> AuthResult<()> {
        let snapshot = SessionSnapshot {
            is_authenticated,
            has_oauth_token,
            origin: self.origin,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::storage(format!("failed to create snapshot directory: {}", e))
            })?;
        }

        let content = serde_json::to_string(&snapshot)
            .map_err(|e| AuthError::internal(format!("failed to serialize snapshot: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .map_err(|e| AuthError::storage(format!("failed to write snapshot: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| AuthError::storage(format!("failed to rename snapshot: {}", e)))?;

        debug!(
            is_authenticated = is_authenticated,
            has_oauth_token = has_oauth_token,
            "wrote session snapshot"
        );
        Ok(())
    }

    /// Reads the current snapshot, if one exists and parses.
    pub fn read(&self) -> Option<SessionSnapshot> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "ignoring unparseable session snapshot");
                None
            }
        }
    }
}

/// Event emitted by the cross-instance watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum CrossTabEvent {
    /// Another instance wrote a new snapshot; a full resync (reload) is
    /// expected.
    ForeignChange(SessionSnapshot),
}

/// Watches the shared snapshot for foreign writes.
///
/// Own-origin writes are ignored; whatever snapshot exists when the
/// watcher starts is taken as the baseline and not reported.
#[derive(Debug)]
pub struct CrossTabWatcher {
    store: SnapshotStore,
    poll_interval: Duration,
}

impl CrossTabWatcher {
    /// Default polling interval for the shared snapshot.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Creates a watcher over the given store.
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Builder: set the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the watcher until the receiving side is dropped.
    pub async fn run(self, events: mpsc::Sender<CrossTabEvent>) {
        let mut last_seen = self.store.read();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(path = %self.store.path().display(), "cross-instance watcher started");

        loop {
            ticker.tick().await;

            let Some(snapshot) = self.store.read() else {
                continue;
            };
            if snapshot.origin == self.store.origin() {
                continue;
            }
            if last_seen.as_ref() == Some(&snapshot) {
                continue;
            }

            info!(origin = %snapshot.origin, "foreign session snapshot observed, resync required");
            last_seen = Some(snapshot.clone());
            if events
                .send(CrossTabEvent::ForeignChange(snapshot))
                .await
                .is_err()
            {
                debug!("cross-instance event receiver dropped, watcher stopping");
                break;
            }
        }
    }
}
