//! Session context: the authoritative owner of session state
//!
//! One `SessionContext` exists per realm and owns the in-memory tokens, the
//! observable phase flags, and the background monitor. Every transition goes
//! through here so the flags can never disagree with the tokens: the flag and
//! the in-memory credential change together, before any persistence I/O.

use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::TokenClient;
use crate::flow::{AuthorizeRequest, CallbackParams, FlowError, LoginFlow};
use crate::monitor::{self, MonitorConfig, SessionPhase, SessionSnapshot};
use crate::store::StoreError;
use crate::traits::{TokenEndpoint, TokenStore};
use crate::types::{AuthConfig, SessionTokens};

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An operation needed an authenticated session and none exists.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The login flow failed.
    #[error(transparent)]
    Login(#[from] FlowError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Shared state behind the context handle.
///
/// The monitor borrows this through an `Arc` so a dropped context can still
/// wind down cleanly.
pub(crate) struct SessionInner {
    pub(crate) config: AuthConfig,
    pub(crate) monitor: MonitorConfig,
    pub(crate) store: Arc<dyn TokenStore>,
    pub(crate) endpoint: Arc<dyn TokenEndpoint>,
    tokens: RwLock<Option<SessionTokens>>,
    phase_tx: watch::Sender<SessionSnapshot>,
    /// Serializes renewal attempts; `try_lock` failure means one is in flight.
    pub(crate) renew_gate: Mutex<()>,
}

impl SessionInner {
    pub(crate) async fn current_tokens(&self) -> Option<SessionTokens> {
        self.tokens.read().await.clone()
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.phase_tx.borrow().clone()
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        self.phase_tx.send_modify(|snapshot| snapshot.phase = phase);
    }

    /// Install fresh tokens: memory and flag first, persistence after.
    ///
    /// The observable flag flips in the same step as the in-memory credential,
    /// so a reader that sees `Authenticated` can always obtain the token. A
    /// persistence failure is logged and tolerated; it costs restart
    /// survival, not the live session.
    pub(crate) async fn install_tokens(&self, tokens: SessionTokens) {
        {
            let mut slot = self.tokens.write().await;
            *slot = Some(tokens.clone());
        }
        self.set_phase(SessionPhase::Authenticated);

        if let Err(err) = self.store.save(&tokens).await {
            warn!(error = %err, "failed to persist session");
        }
    }

    /// Drop all credentials: memory and flag first, persistence after.
    ///
    /// Deauthentication must be observable even when the disk is unwritable.
    pub(crate) async fn clear_session(&self) {
        {
            let mut slot = self.tokens.write().await;
            *slot = None;
        }
        self.set_phase(SessionPhase::Unauthenticated);

        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear persisted session");
        }
    }
}

/// Per-realm session context.
pub struct SessionContext {
    inner: Arc<SessionInner>,
    shutdown_tx: watch::Sender<bool>,
    monitor_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    /// Create a context talking to the real token endpoint.
    #[must_use]
    pub fn new(config: AuthConfig, store: Arc<dyn TokenStore>) -> Self {
        let endpoint = Arc::new(TokenClient::new(config.clone()));
        Self::with_endpoint(config, store, endpoint)
    }

    /// Create a context over an explicit endpoint implementation.
    #[must_use]
    pub fn with_endpoint(
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self::with_monitor_config(config, store, endpoint, MonitorConfig::default())
    }

    /// Create a context with a custom monitor cadence.
    #[must_use]
    pub fn with_monitor_config(
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        monitor: MonitorConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionSnapshot {
            phase: SessionPhase::Uninitialized,
            realm: config.realm.clone(),
        });
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                config,
                monitor,
                store,
                endpoint,
                tokens: RwLock::new(None),
                phase_tx,
                renew_gate: Mutex::new(()),
            }),
            shutdown_tx,
            monitor_handle: std::sync::Mutex::new(None),
        }
    }

    /// The realm this session is scoped to.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.inner.config.realm
    }

    /// Bootstrap the session from persisted state.
    ///
    /// Holds the session in `Loading` until a verdict exists: a persisted
    /// token that is already stale is renewed before the verdict, so the
    /// first resolved snapshot is never a false `Authenticated` that a
    /// renewal then revokes. Resolves exactly once, to `Authenticated` or
    /// `Unauthenticated`.
    pub async fn initialize(&self) -> SessionSnapshot {
        self.inner.set_phase(SessionPhase::Loading);

        let persisted = match self.inner.store.load().await {
            Ok(persisted) => persisted,
            Err(err) => {
                // Unreadable persisted state is treated as absent, and
                // removed so the next start does not trip over it again.
                warn!(error = %err, "persisted session unreadable, discarding");
                self.inner.clear_session().await;
                return self.inner.snapshot();
            }
        };

        let Some(tokens) = persisted else {
            info!("no persisted session");
            self.inner.set_phase(SessionPhase::Unauthenticated);
            return self.inner.snapshot();
        };

        if tokens.expires_within(self.inner.monitor.renew_threshold) {
            // Renew while still Loading so the guard never momentarily
            // admits a session that is about to be revoked.
            let _gate = self.inner.renew_gate.lock().await;
            match tokens.refresh_token.as_deref() {
                Some(refresh_token) => {
                    if monitor::renew_with(&self.inner, refresh_token).await.is_err() {
                        self.inner.clear_session().await;
                    }
                }
                None => {
                    info!("persisted session expired with no refresh token");
                    self.inner.clear_session().await;
                }
            }
        } else {
            info!(realm = %self.inner.config.realm, "restored persisted session");
            self.inner.install_tokens(tokens).await;
        }

        self.inner.snapshot()
    }

    /// Phase one of login: persist single-use state and return the
    /// authorization URL to navigate to.
    ///
    /// # Errors
    /// Returns an error if the pending state cannot be persisted.
    pub async fn begin_login(&self) -> Result<AuthorizeRequest, SessionError> {
        Ok(self.login_flow().begin().await?)
    }

    /// Phase two of login: validate the callback, exchange the code, and
    /// authenticate the session.
    ///
    /// # Errors
    /// Returns an error if the callback is invalid or the exchange fails.
    pub async fn complete_login(
        &self,
        params: &CallbackParams,
        correlation: Option<&str>,
    ) -> Result<SessionSnapshot, SessionError> {
        let tokens = self.login_flow().complete(params, correlation).await?;
        self.inner.install_tokens(tokens).await;
        Ok(self.inner.snapshot())
    }

    /// Authenticate with tokens obtained outside the redirect flow, e.g.
    /// through a direct grant.
    pub async fn set_auth_tokens(&self, tokens: SessionTokens) -> SessionSnapshot {
        self.inner.install_tokens(tokens).await;
        self.inner.snapshot()
    }

    /// End the session: drop in-memory credentials, flip the flag, and wipe
    /// persisted state.
    pub async fn logout(&self) -> SessionSnapshot {
        info!(realm = %self.inner.config.realm, "logging out");
        self.inner.clear_session().await;
        self.inner.snapshot()
    }

    /// The current access token, when authenticated.
    pub async fn access_token(&self) -> Option<String> {
        self.inner.current_tokens().await.map(|tokens| tokens.access_token)
    }

    /// The current token set, when authenticated.
    pub async fn tokens(&self) -> Option<SessionTokens> {
        self.inner.current_tokens().await
    }

    /// The current observable state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot()
    }

    /// Subscribe to state changes. The receiver always holds the latest
    /// snapshot; consumers never observe an intermediate where the flags
    /// disagree with the tokens.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.phase_tx.subscribe()
    }

    /// Start the background lifecycle monitor. Idempotent; a second call is
    /// a no-op while the first monitor is alive.
    pub fn start_monitor(&self) {
        let mut handle = match self.monitor_handle.lock() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        if handle.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let shutdown = self.shutdown_tx.subscribe();
        *handle = Some(tokio::spawn(monitor::run(inner, shutdown)));
    }

    /// Run one monitor pass immediately, outside the fixed cadence.
    pub async fn check_now(&self) {
        monitor::tick(&self.inner).await;
    }

    /// Stop the background monitor and wait for it to exit.
    pub async fn teardown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = {
            let mut slot = match self.monitor_handle.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(
            self.inner.config.clone(),
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.endpoint),
        )
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut slot) = self.monitor_handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
