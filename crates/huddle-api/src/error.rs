//! Error types for authenticated API calls.

use serde::Deserialize;
use thiserror::Error;

use huddle_auth::AuthError;

/// Machine-readable reason attached to a 401 response body.
///
/// Only these two codes identify a recoverable credential problem; a 401
/// without one means the session itself is invalid and a silent refresh
/// would not help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCode {
    /// The delegated resource token has expired.
    TokenExpired,
    /// The server-side session has no resource token at all.
    TokenMissing,
}

impl ExpiryCode {
    /// Parses the wire representation of an expiry code.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "TOKEN_EXPIRED" => Some(Self::TokenExpired),
            "TOKEN_MISSING" => Some(Self::TokenMissing),
            _ => None,
        }
    }

    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenMissing => "TOKEN_MISSING",
        }
    }
}

/// Error body shape returned by the backend on failures.
#[derive(Debug, Deserialize, Default)]
pub struct ErrorBody {
    /// Machine-readable code, when the backend provides one.
    pub code: Option<String>,
    /// Human-readable message.
    pub message: Option<String>,
}

impl ErrorBody {
    /// The expiry code carried by this body, if recognized.
    pub fn expiry_code(&self) -> Option<ExpiryCode> {
        self.code.as_deref().and_then(ExpiryCode::parse)
    }
}

/// An error from an authenticated API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The delegated credential is gone and could not be refreshed
    /// silently; the user must sign in again.
    #[error("delegated access expired, sign-in required")]
    OauthExpired,

    /// The session is unusable for a reason a token refresh cannot fix.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// The backend answered 401. Carries the recognized expiry code, if
    /// any; the retry layer consumes this variant and decides whether a
    /// refresh is worth attempting.
    #[error("unauthorized{}: {message}", code.map(|c| format!(" ({})", c.as_str())).unwrap_or_default())]
    Unauthorized {
        /// Recognized expiry code from the response body.
        code: Option<ExpiryCode>,
        /// Human-readable message from the response body.
        message: String,
    },

    /// The backend answered a non-401 error status.
    #[error("request failed with status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Human-readable message from the response body.
        message: String,
    },

    /// The request never got a usable response.
    #[error("network error: {0}")]
    Network(String),

    /// The response arrived but could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An authentication lifecycle operation failed underneath the call.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// A specialized Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
