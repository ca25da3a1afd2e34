//! Identity and credential types.
//!
//! The identity token and the resource token are distinct in scope and
//! lifetime and are never interchangeable: the former asserts who the user
//! is to the huddle backend, the latter authorizes calls to the external
//! calendar API on the user's behalf.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A signed-in user as reported by the identity provider.
///
/// The provider is the source of truth; holders keep a clone that is valid
/// only until the next identity-change notification or sign-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable unique identifier for the user.
    pub uid: String,
    /// Display name, if the provider supplied one.
    pub display_name: Option<String>,
    /// Primary email address.
    pub email: Option<String>,
    /// Avatar URL.
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl Identity {
    /// Creates a new identity with the given uid.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    /// Builder: set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Builder: set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder: set the avatar URL.
    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

/// Short-lived token asserting the user's identity to the backend.
///
/// Minted on demand through the identity provider, optionally forcing a
/// refresh. Never cached or persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Wraps a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Redacted so tokens never leak through debug logging.
impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityToken(..)")
    }
}

/// Opaque delegated credential scoped to the external calendar API.
///
/// Persisted in durable client storage. Its expiry is not observable on
/// the client; validity is learned reactively when a resource call fails
/// with an expiry-coded 401.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceToken(String);

impl ResourceToken {
    /// Wraps a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ResourceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceToken(..)")
    }
}
