//! Core types for the huddle client session subsystem.
//!
//! Two separately-scoped credentials flow through the system:
//!
//! - [`IdentityToken`] - short-lived, asserts the user's identity to the
//!   huddle backend, minted on demand and never persisted
//! - [`ResourceToken`] - delegated credential for the external calendar
//!   API, persisted in durable client storage
//!
//! [`SessionState`] is the settled view the rest of the application
//! consumes; [`SessionSnapshot`] is the cross-instance resync record.

pub mod credential;
pub mod session;
pub mod tracing;

pub use credential::{Identity, IdentityToken, ResourceToken};
pub use session::{AuthPhase, SessionSnapshot, SessionState};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
