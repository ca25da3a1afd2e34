//! Authentication lifecycle for huddle clients.
//!
//! Implements the dual-token session model: a short-lived identity token
//! minted by the federated identity provider, and a delegated resource
//! token obtained through a user consent flow and persisted in durable
//! client storage. The [`AuthCoordinator`] observes identity changes,
//! settles the session state, keeps the backend session in sync, and runs
//! at most one automatic re-authentication at a time via the
//! [`ReauthGuard`]. Token validity is learned reactively; nothing here
//! inspects or predicts expiry.

pub mod config;
pub mod coordinator;
pub mod crosstab;
pub mod error;
pub mod guard;
pub mod provider;
pub mod store;
pub mod sync;

pub use config::AuthConfig;
pub use coordinator::{AuthCoordinator, CoordinatorCommand, CoordinatorHandle};
pub use crosstab::{CrossTabEvent, CrossTabWatcher, SnapshotStore};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use guard::{ReauthGuard, ReauthLease};
pub use provider::{
    BoxFuture, IdentityEvent, IdentityProvider, IdentitySubscription, StaticProvider,
};
pub use store::ResourceTokenStore;
pub use sync::{HttpSessionSync, SessionPush, SessionSync, build_http_client};
