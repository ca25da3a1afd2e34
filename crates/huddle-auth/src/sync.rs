//! Backend session synchronization.
//!
//! Pushes the identity token, the optional resource token, and the user
//! profile to the backend session store. The push is idempotent: repeated
//! calls with identical tokens leave the server-side session unchanged.
//! The backend answers with a session cookie; the HTTP client is shared
//! with the resource-API clients (see [`build_http_client`]) so the cookie
//! set by a push rides their subsequent requests.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use url::Url;

use huddle_core::{Identity, IdentityToken, ResourceToken};

use crate::error::{AuthError, AuthResult};
use crate::provider::BoxFuture;

/// Credentials and profile pushed to the backend session store.
#[derive(Debug, Clone)]
pub struct SessionPush {
    /// Freshly minted identity token.
    pub identity_token: IdentityToken,
    /// Delegated resource token, absent for identity-only flows.
    pub resource_token: Option<ResourceToken>,
    /// The user the session belongs to.
    pub profile: Identity,
}

/// Capability to establish/refresh the server-side session.
pub trait SessionSync: Send + Sync {
    /// Pushes the credentials to the backend. Idempotent.
    fn push(&self, push: SessionPush) -> BoxFuture<'_, AuthResult<()>>;
}

/// Request body for `POST /api/auth/token`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenSyncBody<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    oauth_token: Option<&'a str>,
    user: &'a Identity,
}

/// Request body for `POST /api/auth/google`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentitySyncBody<'a> {
    token: &'a str,
    user: &'a Identity,
}

/// Builds the HTTP client shared by the session sync and the resource-API
/// clients. There is exactly one cookie jar: the session cookie set by the
/// push must be visible to the resource calls that follow it.
pub fn build_http_client(timeout: Duration) -> AuthResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .cookie_store(true)
        .build()
        .map_err(|e| AuthError::internal(format!("failed to create HTTP client: {}", e)))
}

/// HTTP implementation of [`SessionSync`] against the huddle backend.
#[derive(Debug)]
pub struct HttpSessionSync {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpSessionSync {
    /// Creates a sync client for the given backend base URL.
    ///
    /// `http` must be the same client the resource-API clients use, so
    /// they observe the session cookie the push establishes.
    pub fn new(base_url: Url, http: reqwest::Client) -> Self {
        Self { http, base_url }
    }

    /// Pushes identity-only credentials via `POST /api/auth/google`.
    pub async fn push_identity(
        &self,
        token: &IdentityToken,
        profile: &Identity,
    ) -> AuthResult<()> {
        let url = self.endpoint("api/auth/google")?;
        let body = IdentitySyncBody {
            token: token.as_str(),
            user: profile,
        };
        self.post(url, &body, "identity push").await
    }

    async fn push_session(&self, push: &SessionPush) -> AuthResult<()> {
        let url = self.endpoint("api/auth/token")?;
        let body = TokenSyncBody {
            id_token: push.identity_token.as_str(),
            oauth_token: push.resource_token.as_ref().map(ResourceToken::as_str),
            user: &push.profile,
        };
        self.post(url, &body, "session push").await
    }

    async fn post<B: Serialize>(&self, url: Url, body: &B, what: &str) -> AuthResult<()> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::network(format!("{} timed out", what))
                } else {
                    AuthError::network(format!("{} failed: {}", what, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::backend_sync(format!(
                "{} rejected ({}): {}",
                what, status, message
            )));
        }

        debug!("{} accepted", what);
        Ok(())
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AuthError::internal(format!("invalid endpoint path {}: {}", path, e)))
    }
}

impl SessionSync for HttpSessionSync {
    fn push(&self, push: SessionPush) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move { self.push_session(&push).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn token_sync_body_wire_format() {
        let identity = Identity::new("uid-1").with_display_name("Ada");
        let body = TokenSyncBody {
            id_token: "id-token",
            oauth_token: Some("oauth-token"),
            user: &identity,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["idToken"], "id-token");
        assert_eq!(json["oauthToken"], "oauth-token");
        assert_eq!(json["user"]["uid"], "uid-1");
        assert_eq!(json["user"]["displayName"], "Ada");
    }

    #[test]
    fn token_sync_body_omits_absent_oauth_token() {
        let identity = Identity::new("uid-1");
        let body = TokenSyncBody {
            id_token: "id-token",
            oauth_token: None,
            user: &identity,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("oauthToken").is_none());
    }

    #[test]
    fn identity_sync_body_wire_format() {
        let identity = Identity::new("uid-1");
        let body = IdentitySyncBody {
            token: "id-token",
            user: &identity,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["token"], "id-token");
        assert_eq!(json["user"]["uid"], "uid-1");
    }

    /// In-memory backend modelling the server-side session store:
    /// one session record per user, keyed by the pushed credentials.
    struct FakeBackend {
        sessions: Mutex<HashMap<String, (String, Option<String>)>>,
        writes: Mutex<u32>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                sessions: Mutex::new(HashMap::new()),
                writes: Mutex::new(0),
            }
        }
    }

    impl SessionSync for FakeBackend {
        fn push(&self, push: SessionPush) -> BoxFuture<'_, AuthResult<()>> {
            Box::pin(async move {
                *self.writes.lock().unwrap() += 1;
                self.sessions.lock().unwrap().insert(
                    push.profile.uid.clone(),
                    (
                        push.identity_token.as_str().to_string(),
                        push.resource_token.map(|t| t.as_str().to_string()),
                    ),
                );
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn push_is_idempotent() {
        let backend = FakeBackend::new();
        let push = SessionPush {
            identity_token: IdentityToken::new("id-token"),
            resource_token: Some(ResourceToken::new("oauth-token")),
            profile: Identity::new("uid-1"),
        };

        backend.push(push.clone()).await.unwrap();
        let first = backend.sessions.lock().unwrap().clone();

        backend.push(push).await.unwrap();
        let second = backend.sessions.lock().unwrap().clone();

        // Repeated pushes with identical tokens leave the session unchanged.
        assert_eq!(first, second);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn push_without_resource_token_is_accepted() {
        let backend = FakeBackend::new();
        let push = SessionPush {
            identity_token: IdentityToken::new("id-token"),
            resource_token: None,
            profile: Identity::new("uid-1"),
        };

        backend.push(push).await.unwrap();
        let sessions = backend.sessions.lock().unwrap();
        assert_eq!(sessions.get("uid-1").unwrap().1, None);
    }
}
