//! Expiry-driven retry for authenticated requests.
//!
//! Wraps backend calls so an expiry-coded 401 triggers one silent
//! credential refresh followed by a single retry. Token validity is only
//! ever learned this way, from the server's rejection; nothing inspects
//! tokens or predicts expiry. If the retried call is rejected again, or
//! the 401 carries no recognized expiry code, the failure surfaces as a
//! sign-in requirement instead of looping.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use huddle_auth::store::ResourceTokenStore;
use huddle_auth::sync::{SessionPush, SessionSync};
use huddle_auth::IdentityProvider;
use huddle_core::SessionState;

use crate::error::{ApiError, ApiResult};

/// Number of silent refresh-and-retry rounds per call.
///
/// Exactly one: a second expiry-coded 401 after a refresh means the fresh
/// credentials are not accepted, and retrying further would loop.
const RETRY_BUDGET: u32 = 1;

/// Executes backend operations with expiry-driven credential recovery.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct AuthenticatedRequest {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<ResourceTokenStore>,
    sync: Arc<dyn SessionSync>,
    session: watch::Receiver<SessionState>,
}

impl AuthenticatedRequest {
    /// Creates a wrapper over the given collaborators and session view.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<ResourceTokenStore>,
        sync: Arc<dyn SessionSync>,
        session: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            provider,
            store,
            sync,
            session,
        }
    }

    /// Runs `op`, refreshing credentials and retrying once if the backend
    /// rejects it with an expiry-coded 401.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut budget = RETRY_BUDGET;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(ApiError::Unauthorized {
                    code: Some(code), ..
                }) if budget > 0 => {
                    budget -= 1;
                    debug!(
                        code = code.as_str(),
                        "expiry-coded 401, refreshing credentials before retry"
                    );
                    self.refresh_session().await?;
                }
                Err(ApiError::Unauthorized { code, message }) => {
                    if code.is_some() {
                        warn!("retry after refresh was rejected again, sign-in required");
                    } else {
                        debug!("401 without expiry code, not retrying");
                    }
                    return Err(ApiError::AuthRequired(message));
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Silently rebuilds the credential pair and pushes it to the backend:
    /// consent flow for a fresh resource token, forced identity token mint,
    /// then a session push so the server sees both before the retry.
    async fn refresh_session(&self) -> ApiResult<()> {
        let resource_token = self
            .store
            .force_refresh(self.provider.as_ref())
            .await
            .map_err(|e| {
                warn!(error = %e, "resource token refresh failed, interactive sign-in required");
                ApiError::OauthExpired
            })?;

        let profile = self
            .session
            .borrow()
            .identity
            .clone()
            .or_else(|| self.provider.current_identity())
            .ok_or_else(|| ApiError::AuthRequired("no signed-in user".to_string()))?;

        let identity_token = self
            .provider
            .mint_identity_token(true)
            .await
            .map_err(|e| ApiError::AuthRequired(format!("identity token mint failed: {}", e)))?;

        self.sync
            .push(SessionPush {
                identity_token,
                resource_token: Some(resource_token),
                profile,
            })
            .await
            .map_err(|e| ApiError::AuthRequired(format!("session push failed: {}", e)))?;

        debug!("credentials refreshed and pushed");
        Ok(())
    }
}
