//! Error types for authentication lifecycle operations.

use std::fmt;

use thiserror::Error;

/// The category of an authentication error.
///
/// Classifies failures for propagation decisions: whether an operation may
/// be retried automatically or must surface to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// Interactive sign-in was rejected or aborted; the user may retry.
    SignInFailed,
    /// Resource-token refresh failed; one automatic re-auth attempt may
    /// recover it.
    RefreshFailed,
    /// The delegated credential is gone and cannot be refreshed without
    /// interactive sign-in.
    OauthExpired,
    /// Push to the backend session store failed; non-fatal, re-attempted
    /// opportunistically on the next request.
    BackendSync,
    /// The request requires an authenticated session.
    AuthRequired,
    /// Durable client storage failed (read/write/permissions).
    Storage,
    /// Network error - connection failed, timeout, DNS resolution.
    Network,
    /// The server returned something we could not parse.
    InvalidResponse,
    /// Internal error - unexpected state, bug.
    Internal,
}

impl AuthErrorCode {
    /// Returns true if the failure may be resolved by an automatic retry
    /// or re-auth attempt, without user interaction.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RefreshFailed | Self::BackendSync | Self::Network)
    }

    /// Returns a stable snake_case name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignInFailed => "sign_in_failed",
            Self::RefreshFailed => "refresh_failed",
            Self::OauthExpired => "oauth_expired",
            Self::BackendSync => "backend_sync",
            Self::AuthRequired => "auth_required",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::InvalidResponse => "invalid_response",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error from the authentication lifecycle.
#[derive(Debug, Error)]
pub struct AuthError {
    /// The code categorizing this error.
    code: AuthErrorCode,
    /// Human-readable description.
    message: String,
    /// Underlying cause, if any.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a sign-in failure.
    pub fn sign_in_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::SignInFailed, message)
    }

    /// Creates a token refresh failure.
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::RefreshFailed, message)
    }

    /// Creates an expired-delegation failure (interactive sign-in required).
    pub fn oauth_expired(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::OauthExpired, message)
    }

    /// Creates a backend session sync failure.
    pub fn backend_sync(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::BackendSync, message)
    }

    /// Creates an authentication-required failure.
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthRequired, message)
    }

    /// Creates a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Storage, message)
    }

    /// Creates a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Network, message)
    }

    /// Creates an invalid response failure.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidResponse, message)
    }

    /// Creates an internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Internal, message)
    }

    /// Attaches the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this failure may resolve without user interaction.
    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
