//! IdentityProvider trait definition.
//!
//! This module defines the [`IdentityProvider`] trait, the capability
//! abstraction for the federated sign-in backend. The real provider lives
//! in the embedding application; this subsystem only consumes it.
//!
//! Providers are responsible for:
//! - Emitting identity-change notifications
//! - Minting fresh short-lived identity tokens
//! - Running the interactive sign-in/sign-out flows
//! - Running the delegated consent flow for the resource token

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;

use huddle_core::{Identity, IdentityToken, ResourceToken};

use crate::error::{AuthError, AuthResult};

/// A boxed future, as returned by trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A change in the identity provider's signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityEvent {
    /// The signed-in user changed; `None` means signed out.
    Changed(Option<Identity>),
}

/// A cancellable, single-consumer stream of identity changes.
///
/// Events are delivered in the order the provider emits them and are
/// consumed by exactly one task, so the coordinator processes each change
/// fully before the next is handled.
pub struct IdentitySubscription {
    events: mpsc::Receiver<IdentityEvent>,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl IdentitySubscription {
    /// Creates a subscription from a receiver and a cancel action.
    pub fn new(
        events: mpsc::Receiver<IdentityEvent>,
        cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            events,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a subscription with no cancel action.
    pub fn detached(events: mpsc::Receiver<IdentityEvent>) -> Self {
        Self {
            events,
            cancel: None,
        }
    }

    /// Receives the next identity event.
    ///
    /// Returns `None` when the provider has dropped the stream.
    pub async fn recv(&mut self) -> Option<IdentityEvent> {
        self.events.recv().await
    }

    /// Cancels the subscription explicitly.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for IdentitySubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Federated sign-in capability.
///
/// Injected into the coordinator at construction. Interactive methods
/// (`sign_in`, `request_resource_token`) may suspend indefinitely while the
/// user completes a popup or redirect round-trip; there is no cancellation
/// of an in-flight consent flow.
pub trait IdentityProvider: Send + Sync {
    /// Subscribes to identity-change notifications.
    fn subscribe(&self) -> IdentitySubscription;

    /// Returns the currently signed-in user, if any.
    fn current_identity(&self) -> Option<Identity>;

    /// Mints a fresh identity token, optionally forcing a refresh.
    fn mint_identity_token(&self, force_refresh: bool) -> BoxFuture<'_, AuthResult<IdentityToken>>;

    /// Starts the interactive sign-in flow.
    fn sign_in(&self) -> BoxFuture<'_, AuthResult<Identity>>;

    /// Signs the current user out.
    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>>;

    /// Runs the delegated consent flow to obtain a fresh resource token.
    fn request_resource_token(&self) -> BoxFuture<'_, AuthResult<ResourceToken>>;
}

/// An [`IdentityProvider`] backed by fixed, settable data.
///
/// Useful as a stand-in while wiring an application and throughout the
/// test suites: identity and resource token are plain fields, every consent
/// request is counted, and `set_identity` fans the change out to all
/// subscribers in emission order.
pub struct StaticProvider {
    identity: RwLock<Option<Identity>>,
    resource_token: RwLock<Option<ResourceToken>>,
    consent_delay: RwLock<Duration>,
    consent_requests: AtomicUsize,
    minted_tokens: AtomicUsize,
    subscribers: Arc<Mutex<Vec<(u64, mpsc::Sender<IdentityEvent>)>>>,
    next_subscriber_id: AtomicU64,
}

impl StaticProvider {
    /// Creates a provider with no signed-in user.
    pub fn new() -> Self {
        Self {
            identity: RwLock::new(None),
            resource_token: RwLock::new(None),
            consent_delay: RwLock::new(Duration::ZERO),
            consent_requests: AtomicUsize::new(0),
            minted_tokens: AtomicUsize::new(0),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Creates a provider with the given user already signed in.
    pub fn with_identity(identity: Identity) -> Self {
        let provider = Self::new();
        *provider.identity.write().unwrap() = Some(identity);
        provider
    }

    /// Sets the signed-in user and notifies subscribers.
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write().unwrap() = identity.clone();
        self.broadcast(IdentityEvent::Changed(identity));
    }

    /// Sets the token the consent flow will hand out (`None` to make the
    /// flow fail).
    pub fn set_resource_token(&self, token: Option<ResourceToken>) {
        *self.resource_token.write().unwrap() = token;
    }

    /// Sets an artificial delay for the consent flow, simulating a user
    /// sitting on the consent screen.
    pub fn set_consent_delay(&self, delay: Duration) {
        *self.consent_delay.write().unwrap() = delay;
    }

    /// Number of consent flows started so far.
    pub fn consent_requests(&self) -> usize {
        self.consent_requests.load(Ordering::SeqCst)
    }

    /// Number of identity tokens minted so far.
    pub fn minted_tokens(&self) -> usize {
        self.minted_tokens.load(Ordering::SeqCst)
    }

    fn broadcast(&self, event: IdentityEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| tx.try_send(event.clone()).is_ok());
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for StaticProvider {
    fn subscribe(&self) -> IdentitySubscription {
        let (tx, rx) = mpsc::channel(16);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().push((id, tx));

        let subscribers = Arc::clone(&self.subscribers);
        IdentitySubscription::new(rx, move || {
            subscribers.lock().unwrap().retain(|(sid, _)| *sid != id);
        })
    }

    fn current_identity(&self) -> Option<Identity> {
        self.identity.read().unwrap().clone()
    }

    fn mint_identity_token(&self, _force_refresh: bool) -> BoxFuture<'_, AuthResult<IdentityToken>> {
        Box::pin(async move {
            if self.identity.read().unwrap().is_none() {
                return Err(AuthError::auth_required("no signed-in user"));
            }
            let n = self.minted_tokens.fetch_add(1, Ordering::SeqCst);
            Ok(IdentityToken::new(format!("identity-token-{}", n)))
        })
    }

    fn sign_in(&self) -> BoxFuture<'_, AuthResult<Identity>> {
        Box::pin(async move {
            let identity = self
                .identity
                .read()
                .unwrap()
                .clone()
                .ok_or_else(|| AuthError::sign_in_failed("sign-in aborted"))?;
            self.broadcast(IdentityEvent::Changed(Some(identity.clone())));
            Ok(identity)
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            *self.identity.write().unwrap() = None;
            self.broadcast(IdentityEvent::Changed(None));
            Ok(())
        })
    }

    fn request_resource_token(&self) -> BoxFuture<'_, AuthResult<ResourceToken>> {
        Box::pin(async move {
            self.consent_requests.fetch_add(1, Ordering::SeqCst);
            let delay = *self.consent_delay.read().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.resource_token
                .read()
                .unwrap()
                .clone()
                .ok_or_else(|| AuthError::refresh_failed("consent flow declined"))
        })
    }
}
