//! Calendar API client.
//!
//! Thin client over the backend's calendar endpoints. Every call goes
//! through [`AuthenticatedRequest`], so an expiry-coded 401 is recovered
//! silently. Authentication rides the backend session cookie; no tokens
//! appear in these requests. The HTTP client is the one the session sync
//! pushes through, so a cookie established mid-call is visible to the
//! retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::retry::AuthenticatedRequest;

/// A calendar event as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// Backend event id.
    pub id: String,
    /// Event title.
    pub summary: String,
    /// Optional longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Start time.
    pub start: DateTime<Utc>,
    /// End time.
    pub end: DateTime<Utc>,
    /// Video call link, when the event has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meet_link: Option<String>,
}

/// Payload for creating an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    /// Event title.
    pub summary: String,
    /// Optional longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Start time.
    pub start: DateTime<Utc>,
    /// End time.
    pub end: DateTime<Utc>,
}

impl NewEvent {
    /// Creates an event payload with the given title and times.
    pub fn new(summary: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            summary: summary.into(),
            description: None,
            location: None,
            start,
            end,
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Deserialize)]
struct ListEventsResponse {
    events: Vec<CalendarEvent>,
}

#[derive(Deserialize)]
struct EventResponse {
    event: CalendarEvent,
}

/// Client for the backend calendar endpoints.
pub struct CalendarClient {
    http: reqwest::Client,
    base_url: Url,
    request: AuthenticatedRequest,
}

impl CalendarClient {
    /// Creates a client for the given backend base URL.
    ///
    /// `http` must be the same client the session sync pushes through
    /// (see `huddle_auth::sync::build_http_client`); a private client
    /// would never see the session cookie.
    pub fn new(base_url: Url, request: AuthenticatedRequest, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url,
            request,
        }
    }

    /// Lists events in the given time window.
    pub async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> ApiResult<Vec<CalendarEvent>> {
        self.request
            .call(|| self.fetch_events(time_min, time_max))
            .await
    }

    /// Creates an event.
    pub async fn create_event(&self, event: &NewEvent) -> ApiResult<CalendarEvent> {
        self.request.call(|| self.post_event(event)).await
    }

    /// Deletes an event by id.
    pub async fn delete_event(&self, event_id: &str) -> ApiResult<()> {
        self.request.call(|| self.remove_event(event_id)).await
    }

    async fn fetch_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> ApiResult<Vec<CalendarEvent>> {
        let url = self.endpoint("api/calendar/events")?;
        debug!(%url, "listing calendar events");

        let response = self
            .http
            .get(url)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let body: ListEventsResponse = Self::decode(response).await?;
        Ok(body.events)
    }

    async fn post_event(&self, event: &NewEvent) -> ApiResult<CalendarEvent> {
        let url = self.endpoint("api/calendar/events")?;
        debug!(%url, summary = %event.summary, "creating calendar event");

        let response = self
            .http
            .post(url)
            .json(event)
            .send()
            .await
            .map_err(request_error)?;

        let body: EventResponse = Self::decode(response).await?;
        Ok(body.event)
    }

    async fn remove_event(&self, event_id: &str) -> ApiResult<()> {
        let url = self.endpoint(&format!("api/calendar/events/{}", event_id))?;
        debug!(%url, "deleting calendar event");

        let response = self.http.delete(url).send().await.map_err(request_error)?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(())
    }

    /// Decodes a successful JSON body, or maps the failure status.
    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("failed to decode response: {}", e)))
    }

    /// Maps a non-success response to an [`ApiError`]. A 401 is inspected
    /// for an expiry code so the retry layer can decide whether a silent
    /// refresh is worth attempting.
    async fn decode_error(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body
            .message
            .clone()
            .unwrap_or_else(|| status.to_string());

        if status == reqwest::StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized {
                code: body.expiry_code(),
                message,
            }
        } else {
            ApiError::Status {
                status: status.as_u16(),
                message,
            }
        }
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid endpoint path {}: {}", path, e)))
    }
}

fn request_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Network("request timed out".to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::AuthenticatedRequest;
    use chrono::TimeZone;
    use huddle_auth::provider::StaticProvider;
    use huddle_auth::store::ResourceTokenStore;
    use huddle_auth::sync::{HttpSessionSync, build_http_client};
    use huddle_core::{Identity, ResourceToken, SessionState};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::watch;

    #[test]
    fn event_wire_format_round_trip() {
        let json = r#"{
            "id": "evt-1",
            "summary": "Standup",
            "description": "Daily sync",
            "start": "2026-08-24T09:00:00Z",
            "end": "2026-08-24T09:15:00Z",
            "meetLink": "https://meet.example.com/abc"
        }"#;

        let event: CalendarEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.summary, "Standup");
        assert_eq!(event.meet_link.as_deref(), Some("https://meet.example.com/abc"));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["meetLink"], "https://meet.example.com/abc");
        assert!(value.get("meet_link").is_none());
    }

    #[test]
    fn event_optional_fields_may_be_absent() {
        let json = r#"{
            "id": "evt-2",
            "summary": "Focus block",
            "start": "2026-08-24T10:00:00Z",
            "end": "2026-08-24T12:00:00Z"
        }"#;

        let event: CalendarEvent = serde_json::from_str(json).unwrap();
        assert!(event.description.is_none());
        assert!(event.meet_link.is_none());
    }

    #[test]
    fn new_event_wire_format() {
        let start = Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 24, 9, 30, 0).unwrap();
        let event = NewEvent::new("Standup", start, end).with_description("Daily sync");

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["summary"], "Standup");
        assert_eq!(value["description"], "Daily sync");
        assert!(value["start"].as_str().unwrap().starts_with("2026-08-24T09:00:00"));
    }

    #[test]
    fn new_event_omits_absent_description() {
        let start = Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 24, 9, 30, 0).unwrap();
        let event = NewEvent::new("Standup", start, end);

        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("description").is_none());
    }

    #[test]
    fn list_response_parses() {
        let json = r#"{"events": [{
            "id": "evt-1",
            "summary": "Standup",
            "start": "2026-08-24T09:00:00Z",
            "end": "2026-08-24T09:15:00Z"
        }]}"#;

        let body: ListEventsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.events.len(), 1);
        assert_eq!(body.events[0].id, "evt-1");
    }

    /// Loopback backend: `POST /api/auth/token` sets the session cookie,
    /// `GET /api/calendar/events` requires it and answers a coded 401
    /// without it.
    struct Backend {
        pushes: AtomicUsize,
        event_requests: AtomicUsize,
        cookieless_event_requests: AtomicUsize,
    }

    impl Backend {
        async fn spawn() -> (SocketAddr, Arc<Self>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let backend = Arc::new(Self {
                pushes: AtomicUsize::new(0),
                event_requests: AtomicUsize::new(0),
                cookieless_event_requests: AtomicUsize::new(0),
            });

            let accepting = backend.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let backend = accepting.clone();
                    tokio::spawn(async move { backend.handle(socket).await });
                }
            });
            (addr, backend)
        }

        async fn handle(&self, mut socket: TcpStream) {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let request_line = head.lines().next().unwrap_or_default();
            let has_session_cookie = head.lines().any(|line| {
                line.to_ascii_lowercase().starts_with("cookie:") && line.contains("session=abc")
            });

            let (status, extra, body) = if request_line.starts_with("POST /api/auth/token") {
                self.pushes.fetch_add(1, Ordering::SeqCst);
                (
                    "HTTP/1.1 200 OK",
                    "Set-Cookie: session=abc; Path=/\r\n",
                    "{}".to_string(),
                )
            } else if request_line.starts_with("GET /api/calendar/events") {
                self.event_requests.fetch_add(1, Ordering::SeqCst);
                if has_session_cookie {
                    (
                        "HTTP/1.1 200 OK",
                        "",
                        concat!(
                            r#"{"events":[{"id":"evt-1","summary":"Standup","#,
                            r#""start":"2026-08-24T09:00:00Z","end":"2026-08-24T09:15:00Z"}]}"#
                        )
                        .to_string(),
                    )
                } else {
                    self.cookieless_event_requests.fetch_add(1, Ordering::SeqCst);
                    (
                        "HTTP/1.1 401 Unauthorized",
                        "",
                        r#"{"code":"TOKEN_EXPIRED","message":"resource token expired"}"#
                            .to_string(),
                    )
                }
            } else {
                ("HTTP/1.1 404 Not Found", "", "{}".to_string())
            };

            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
                status,
                body.len(),
                extra,
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    }

    #[tokio::test]
    async fn session_cookie_set_by_push_rides_the_retried_call() {
        let (addr, backend) = Backend::spawn().await;
        let base_url: Url = format!("http://{}/", addr).parse().unwrap();

        let dir = tempdir().unwrap();
        let provider = Arc::new(StaticProvider::with_identity(Identity::new("uid-1")));
        provider.set_resource_token(Some(ResourceToken::new("consented")));
        let store = Arc::new(ResourceTokenStore::new(dir.path().join("token.json")));

        // One client, one cookie jar, shared by the push and the calls.
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        let sync = Arc::new(HttpSessionSync::new(base_url.clone(), http.clone()));

        let mut state = SessionState::initial();
        state.identity = Some(Identity::new("uid-1"));
        let (_tx, session) = watch::channel(state);

        let request = AuthenticatedRequest::new(provider, store, sync, session);
        let client = CalendarClient::new(base_url, request, http);

        let time_min = Utc.with_ymd_and_hms(2026, 8, 24, 0, 0, 0).unwrap();
        let time_max = Utc.with_ymd_and_hms(2026, 8, 25, 0, 0, 0).unwrap();
        let events = client.list_events(time_min, time_max).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "evt-1");
        // First call cookieless and rejected, one push established the
        // session, the retry carried the cookie and succeeded.
        assert_eq!(backend.event_requests.load(Ordering::SeqCst), 2);
        assert_eq!(backend.cookieless_event_requests.load(Ordering::SeqCst), 1);
        assert_eq!(backend.pushes.load(Ordering::SeqCst), 1);
    }
}
