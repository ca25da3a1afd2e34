//! Session state machine types.
//!
//! [`SessionState`] is the only view of authentication the presentation
//! layer consumes. Raw tokens never appear here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credential::Identity;

/// Phases of the authentication state machine.
///
/// Transitions: `Init → Loading → {Unauthenticated |
/// AuthenticatedNoResource | AuthenticatedWithResource} ⇄ Reauthenticating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// No identity notification received yet.
    Init,
    /// An identity change is being processed.
    Loading,
    /// No signed-in user.
    Unauthenticated,
    /// Signed in, but no delegated resource token is available.
    AuthenticatedNoResource,
    /// Signed in with a delegated resource token on hand.
    AuthenticatedWithResource,
    /// A guarded automatic re-authentication attempt is in flight.
    Reauthenticating,
}

impl AuthPhase {
    /// Returns true if this phase is settled (no transition in flight).
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::AuthenticatedNoResource | Self::AuthenticatedWithResource
        )
    }

    /// Returns true if a user is signed in during this phase.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            Self::AuthenticatedNoResource | Self::AuthenticatedWithResource
        )
    }
}

/// The coordinator's externally visible session view.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// The signed-in user, if any.
    pub identity: Option<Identity>,
    /// Current state-machine phase.
    pub phase: AuthPhase,
    /// Whether a delegated resource token is held for this session.
    pub has_resource_token: bool,
    /// True only while a transition is in flight. Guaranteed to return to
    /// false within the coordinator's settle ceiling.
    pub is_loading: bool,
}

impl SessionState {
    /// The state before any identity notification has been processed.
    pub fn initial() -> Self {
        Self {
            identity: None,
            phase: AuthPhase::Init,
            has_resource_token: false,
            is_loading: true,
        }
    }

    /// Returns true if a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some() && self.phase.is_authenticated()
    }

    /// Derives the cross-instance snapshot for this state.
    pub fn snapshot(&self, origin: Uuid) -> SessionSnapshot {
        SessionSnapshot {
            is_authenticated: self.is_authenticated(),
            has_oauth_token: self.has_resource_token,
            origin,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Authentication snapshot shared between client instances.
///
/// Written whenever the coordinator settles; other instances observe a
/// foreign `origin` and force a full resync rather than merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Whether a user is signed in.
    pub is_authenticated: bool,
    /// Whether a delegated resource token is held.
    #[serde(rename = "hasOAuthToken")]
    pub has_oauth_token: bool,
    /// Identifies the instance that wrote the snapshot.
    pub origin: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_settled_classification() {
        assert!(!AuthPhase::Init.is_settled());
        assert!(!AuthPhase::Loading.is_settled());
        assert!(!AuthPhase::Reauthenticating.is_settled());
        assert!(AuthPhase::Unauthenticated.is_settled());
        assert!(AuthPhase::AuthenticatedNoResource.is_settled());
        assert!(AuthPhase::AuthenticatedWithResource.is_settled());
    }

    #[test]
    fn initial_state_is_loading() {
        let state = SessionState::initial();
        assert_eq!(state.phase, AuthPhase::Init);
        assert!(state.is_loading);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn authenticated_requires_identity_and_phase() {
        let mut state = SessionState::initial();
        state.phase = AuthPhase::AuthenticatedWithResource;
        // Phase alone is not enough.
        assert!(!state.is_authenticated());

        state.identity = Some(Identity::new("uid-1"));
        assert!(state.is_authenticated());
    }

    #[test]
    fn snapshot_wire_format() {
        let origin = Uuid::new_v4();
        let mut state = SessionState::initial();
        state.identity = Some(Identity::new("uid-1"));
        state.phase = AuthPhase::AuthenticatedWithResource;
        state.has_resource_token = true;
        state.is_loading = false;

        let snap = state.snapshot(origin);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["hasOAuthToken"], true);
        assert_eq!(json["origin"], origin.to_string());
    }

    #[test]
    fn snapshot_round_trip() {
        let snap = SessionSnapshot {
            is_authenticated: true,
            has_oauth_token: false,
            origin: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
