//! Resource token storage.
//!
//! Persists the delegated calendar credential in durable client storage.
//! Expiry is deliberately not tracked here: the token is opaque and its
//! validity is only learned reactively from an expiry-coded 401, at which
//! point [`ResourceTokenStore::force_refresh`] obtains a replacement
//! through the provider's consent flow.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use huddle_core::ResourceToken;

use crate::error::{AuthError, AuthResult};
use crate::provider::IdentityProvider;

/// On-disk record for the stored token.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    token: ResourceToken,
    saved_at: DateTime<Utc>,
}

/// Persisted resource-token storage with a file backend.
///
/// The token is stored as JSON with restrictive permissions; writes go
/// through a temp file and rename for atomicity.
#[derive(Debug)]
pub struct ResourceTokenStore {
    path: PathBuf,
    token: RwLock<Option<ResourceToken>>,
}

impl ResourceTokenStore {
    /// Creates a store at the given path. Call [`load`](Self::load) to
    /// pick up a previously persisted token.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            token: RwLock::new(None),
        }
    }

    /// Loads the token from disk into memory.
    ///
    /// Returns `Ok(true)` if a token was loaded, `Ok(false)` if none exists.
    pub fn load(&self) -> AuthResult<bool> {
        if !self.path.exists() {
            debug!("no resource token file at {:?}", self.path);
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| AuthError::storage(format!("failed to read token file: {}", e)))?;

        let stored: StoredToken = serde_json::from_str(&content)
            .map_err(|e| AuthError::storage(format!("failed to parse token file: {}", e)))?;

        info!("loaded resource token from {:?}", self.path);
        *self.token.write().unwrap() = Some(stored.token);
        Ok(true)
    }

    /// Returns a clone of the current token, if any.
    pub fn get(&self) -> Option<ResourceToken> {
        self.token.read().unwrap().clone()
    }

    /// Returns true if a token is currently held.
    pub fn is_present(&self) -> bool {
        self.token.read().unwrap().is_some()
    }

    /// Sets a new token and persists it.
    pub fn set(&self, token: ResourceToken) -> AuthResult<()> {
        *self.token.write().unwrap() = Some(token);
        self.save()
    }

    /// Clears the stored token, in memory and on disk.
    pub fn clear(&self) -> AuthResult<()> {
        *self.token.write().unwrap() = None;
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| AuthError::storage(format!("failed to remove token file: {}", e)))?;
            info!("cleared resource token at {:?}", self.path);
        }
        Ok(())
    }

    /// Returns the storage path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Obtains a fresh token through the provider's consent flow and
    /// persists it.
    ///
    /// The consent flow may suspend until the user completes it.
    pub async fn force_refresh(
        &self,
        provider: &dyn IdentityProvider,
    ) -> AuthResult<ResourceToken> {
        debug!("requesting fresh resource token via consent flow");
        let token = provider.request_resource_token().await?;
        self.set(token.clone())?;
        info!("resource token refreshed");
        Ok(token)
    }

    fn save(&self) -> AuthResult<()> {
        let token = self.token.read().unwrap();
        let token = token
            .as_ref()
            .ok_or_else(|| AuthError::internal("no token to save"))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::storage(format!("failed to create token directory: {}", e))
            })?;
        }

        let stored = StoredToken {
            token: token.clone(),
            saved_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| AuthError::internal(format!("failed to serialize token: {}", e)))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .map_err(|e| AuthError::storage(format!("failed to write token file: {}", e)))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| AuthError::storage(format!("failed to rename token file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        debug!("saved resource token to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use tempfile::tempdir;

    #[test]
    fn store_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resource-token.json");

        let store = ResourceTokenStore::new(&path);
        store.set(ResourceToken::new("delegated-token")).unwrap();
        assert!(path.exists());

        let store2 = ResourceTokenStore::new(&path);
        assert!(store2.load().unwrap());
        assert_eq!(store2.get().unwrap().as_str(), "delegated-token");
    }

    #[test]
    fn store_load_without_file() {
        let dir = tempdir().unwrap();
        let store = ResourceTokenStore::new(dir.path().join("missing.json"));
        assert!(!store.load().unwrap());
        assert!(!store.is_present());
    }

    #[test]
    fn store_clear_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resource-token.json");

        let store = ResourceTokenStore::new(&path);
        store.set(ResourceToken::new("delegated-token")).unwrap();
        assert!(store.is_present());

        store.clear().unwrap();
        assert!(!store.is_present());
        assert!(!path.exists());
    }

    #[test]
    fn store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resource-token.json");
        fs::write(&path, "not json").unwrap();

        let store = ResourceTokenStore::new(&path);
        assert!(store.load().is_err());
    }

    #[tokio::test]
    async fn force_refresh_persists_fresh_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resource-token.json");

        let provider = StaticProvider::new();
        provider.set_resource_token(Some(ResourceToken::new("fresh")));

        let store = ResourceTokenStore::new(&path);
        let token = store.force_refresh(&provider).await.unwrap();
        assert_eq!(token.as_str(), "fresh");
        assert!(path.exists());
        assert_eq!(store.get().unwrap().as_str(), "fresh");
    }

    #[tokio::test]
    async fn force_refresh_propagates_consent_failure() {
        let dir = tempdir().unwrap();
        let provider = StaticProvider::new();

        let store = ResourceTokenStore::new(dir.path().join("t.json"));
        let err = store.force_refresh(&provider).await.unwrap_err();
        assert_eq!(err.code(), crate::error::AuthErrorCode::RefreshFailed);
        assert!(!store.is_present());
    }
}
