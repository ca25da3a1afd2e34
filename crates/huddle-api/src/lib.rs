//! Authenticated backend API client for huddle.
//!
//! Requests authenticate through the backend session cookie; when the
//! backend rejects a call with an expiry-coded 401, the
//! [`AuthenticatedRequest`] layer refreshes the credential pair once and
//! retries, so callers see either the result or a definitive sign-in
//! requirement.

pub mod calendar;
pub mod error;
pub mod retry;

pub use calendar::{CalendarClient, CalendarEvent, NewEvent};
pub use error::{ApiError, ApiResult, ErrorBody, ExpiryCode};
pub use retry::AuthenticatedRequest;
