//! Authentication coordinator.
//!
//! Owns the session state machine. Identity-change notifications are
//! consumed from a single subscription and processed strictly in order,
//! one change fully before the next, so the machine is never re-entered
//! for the same identity stream.
//!
//! The settle work for one identity change races against a safety timer:
//! if the ceiling fires first, the loading flag is cleared and a
//! conservative settled state is published while the in-flight work is
//! allowed to finish and publish the real outcome. The timer firing is a
//! degraded outcome and is logged as such.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use huddle_core::{AuthPhase, Identity, SessionState};

use crate::config::AuthConfig;
use crate::crosstab::SnapshotStore;
use crate::error::{AuthError, AuthResult};
use crate::guard::ReauthGuard;
use crate::provider::{IdentityEvent, IdentityProvider, IdentitySubscription};
use crate::store::ResourceTokenStore;
use crate::sync::{SessionPush, SessionSync};

/// Commands accepted by a running coordinator.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Start the interactive sign-in flow.
    Login {
        /// Completion channel; carries the sign-in outcome.
        reply: oneshot::Sender<AuthResult<()>>,
    },
    /// Sign out and drop the delegated credential.
    Logout {
        /// Completion channel; carries the sign-out outcome.
        reply: oneshot::Sender<AuthResult<()>>,
    },
    /// Stop the coordinator.
    Stop,
}

/// Top-level orchestrator of the dual-token authentication lifecycle.
///
/// All collaborators are injected at construction; the coordinator never
/// resolves them lazily. Raw tokens are not exposed through the published
/// [`SessionState`].
pub struct AuthCoordinator {
    config: AuthConfig,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<ResourceTokenStore>,
    sync: Arc<dyn SessionSync>,
    guard: ReauthGuard,
    snapshot: Option<SnapshotStore>,
    state_tx: watch::Sender<SessionState>,
    command_tx: mpsc::Sender<CoordinatorCommand>,
    command_rx: Option<mpsc::Receiver<CoordinatorCommand>>,
    events: Option<IdentitySubscription>,
}

impl AuthCoordinator {
    /// Creates a coordinator over the given collaborators.
    pub fn new(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<ResourceTokenStore>,
        sync: Arc<dyn SessionSync>,
    ) -> Self {
        let guard = ReauthGuard::new(&config.guard_path, config.guard_stale_after);
        let (state_tx, _) = watch::channel(SessionState::initial());
        let (command_tx, command_rx) = mpsc::channel(16);

        // Pick up a token persisted by a previous run, so a restart does
        // not re-run the consent flow. A corrupt file counts as absent.
        if let Err(e) = store.load() {
            warn!(error = %e, "failed to load persisted resource token");
        }
        // Subscribe up front so no identity change emitted between
        // construction and run() is lost.
        let events = provider.subscribe();

        Self {
            config,
            provider,
            store,
            sync,
            guard,
            snapshot: None,
            state_tx,
            command_tx,
            command_rx: Some(command_rx),
            events: Some(events),
        }
    }

    /// Builder: publish settled states to the given cross-instance
    /// snapshot store.
    pub fn with_snapshot_store(mut self, snapshot: SnapshotStore) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Returns a handle for observing state and issuing commands.
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            command_tx: self.command_tx.clone(),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// Runs the coordinator until the identity stream closes or a stop
    /// command arrives.
    pub async fn run(mut self) {
        let (Some(mut events), Some(mut command_rx)) =
            (self.events.take(), self.command_rx.take())
        else {
            return;
        };

        info!("auth coordinator started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(IdentityEvent::Changed(identity)) => {
                        self.on_identity_change(identity).await;
                    }
                    None => {
                        info!("identity event stream closed");
                        break;
                    }
                },
                command = command_rx.recv() => match command {
                    Some(CoordinatorCommand::Login { reply }) => {
                        let _ = reply.send(self.do_login().await);
                    }
                    Some(CoordinatorCommand::Logout { reply }) => {
                        let _ = reply.send(self.do_logout().await);
                    }
                    Some(CoordinatorCommand::Stop) | None => {
                        info!("auth coordinator stopping");
                        break;
                    }
                }
            }
        }

        events.unsubscribe();
    }

    async fn on_identity_change(&self, identity: Option<Identity>) {
        let Some(identity) = identity else {
            debug!("identity cleared");
            self.settle_state(None, AuthPhase::Unauthenticated, false);
            return;
        };

        debug!(uid = %identity.uid, "identity changed");
        self.state_tx.send_replace(SessionState {
            identity: Some(identity.clone()),
            phase: AuthPhase::Loading,
            has_resource_token: self.store.is_present(),
            is_loading: true,
        });

        // Race the settle work against the safety timer. The timer firing
        // only clears the loading flag; the in-flight work is not cancelled
        // and publishes the real outcome when it completes.
        let settle = self.settle(&identity);
        tokio::pin!(settle);
        tokio::select! {
            () = &mut settle => {}
            () = tokio::time::sleep(self.config.settle_ceiling) => {
                warn!(
                    ceiling_ms = self.config.settle_ceiling.as_millis() as u64,
                    "settle ceiling elapsed before the session settled, \
                     clearing loading flag"
                );
                let has_token = self.store.is_present();
                let phase = if has_token {
                    AuthPhase::AuthenticatedWithResource
                } else {
                    AuthPhase::AuthenticatedNoResource
                };
                self.settle_state(Some(identity.clone()), phase, has_token);
                settle.await;
            }
        }
    }

    async fn settle(&self, identity: &Identity) {
        if let Some(token) = self.store.get() {
            self.spawn_session_push(identity.clone(), token);
            self.settle_state(
                Some(identity.clone()),
                AuthPhase::AuthenticatedWithResource,
                true,
            );
            return;
        }

        debug!(
            delay_ms = self.config.grace_delay.as_millis() as u64,
            "no stored resource token, waiting out consent grace period"
        );
        tokio::time::sleep(self.config.grace_delay).await;

        if let Some(token) = self.store.get() {
            debug!("resource token arrived during grace period");
            self.spawn_session_push(identity.clone(), token);
            self.settle_state(
                Some(identity.clone()),
                AuthPhase::AuthenticatedWithResource,
                true,
            );
            return;
        }

        match self.guard.acquire() {
            Ok(Some(lease)) => {
                self.state_tx.send_replace(SessionState {
                    identity: Some(identity.clone()),
                    phase: AuthPhase::Reauthenticating,
                    has_resource_token: false,
                    is_loading: true,
                });

                let outcome = self.reauthenticate().await;
                lease.release();

                match outcome {
                    Ok(()) => {
                        self.settle_state(
                            Some(identity.clone()),
                            AuthPhase::AuthenticatedWithResource,
                            true,
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "automatic re-authentication failed");
                        self.settle_state(
                            Some(identity.clone()),
                            AuthPhase::AuthenticatedNoResource,
                            false,
                        );
                    }
                }
            }
            Ok(None) => {
                debug!("re-auth already in flight, settling without resource token");
                self.settle_state(
                    Some(identity.clone()),
                    AuthPhase::AuthenticatedNoResource,
                    false,
                );
            }
            Err(e) => {
                warn!(error = %e, "re-auth guard unavailable");
                self.settle_state(
                    Some(identity.clone()),
                    AuthPhase::AuthenticatedNoResource,
                    false,
                );
            }
        }
    }

    /// One guarded re-authentication attempt: interactive sign-in, consent
    /// flow for the resource token, then a push of both credentials.
    async fn reauthenticate(&self) -> AuthResult<()> {
        info!("starting guarded re-authentication");

        let profile = self.provider.sign_in().await?;
        let resource_token = self.store.force_refresh(self.provider.as_ref()).await?;
        let identity_token = self.provider.mint_identity_token(true).await?;

        self.sync
            .push(SessionPush {
                identity_token,
                resource_token: Some(resource_token),
                profile,
            })
            .await?;

        info!("re-authentication complete");
        Ok(())
    }

    async fn do_login(&self) -> AuthResult<()> {
        let identity = self.provider.sign_in().await?;
        debug!(uid = %identity.uid, "interactive sign-in completed");
        Ok(())
    }

    async fn do_logout(&self) -> AuthResult<()> {
        self.provider.sign_out().await?;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear resource token on sign-out");
        }
        self.settle_state(None, AuthPhase::Unauthenticated, false);
        Ok(())
    }

    /// Mints an identity token and pushes the session in the background.
    /// Failures are logged; the push is re-attempted opportunistically on
    /// the next authenticated request.
    fn spawn_session_push(&self, profile: Identity, token: huddle_core::ResourceToken) {
        let provider = Arc::clone(&self.provider);
        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            let identity_token = match provider.mint_identity_token(false).await {
                Ok(token) => token,
                Err(e) => {
                    warn!(error = %e, "identity token mint failed, skipping session push");
                    return;
                }
            };
            if let Err(e) = sync
                .push(SessionPush {
                    identity_token,
                    resource_token: Some(token),
                    profile,
                })
                .await
            {
                warn!(error = %e, "backend session push failed");
            }
        });
    }

    fn settle_state(&self, identity: Option<Identity>, phase: AuthPhase, has_token: bool) {
        let state = SessionState {
            identity,
            phase,
            has_resource_token: has_token,
            is_loading: false,
        };

        if let Some(ref snapshot) = self.snapshot
            && let Err(e) = snapshot.write(state.is_authenticated(), state.has_resource_token)
        {
            warn!(error = %e, "failed to write session snapshot");
        }

        self.state_tx.send_replace(state);
    }
}

/// Cloneable handle onto a running [`AuthCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<CoordinatorCommand>,
    state_rx: watch::Receiver<SessionState>,
}

impl CoordinatorHandle {
    /// Starts the interactive sign-in flow.
    pub async fn login(&self) -> AuthResult<()> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorCommand::Login { reply })
            .await
            .map_err(|_| AuthError::internal("coordinator stopped"))?;
        rx.await
            .map_err(|_| AuthError::internal("coordinator stopped"))?
    }

    /// Signs out and clears the delegated credential.
    pub async fn logout(&self) -> AuthResult<()> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorCommand::Logout { reply })
            .await
            .map_err(|_| AuthError::internal("coordinator stopped"))?;
        rx.await
            .map_err(|_| AuthError::internal("coordinator stopped"))?
    }

    /// Stops the coordinator.
    pub async fn stop(&self) {
        let _ = self.command_tx.send(CoordinatorCommand::Stop).await;
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Returns a watch receiver over the session state.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}
