//! Token lifecycle monitor
//!
//! A fixed-cadence loop that watches the in-memory session for imminent
//! expiry and renews it through the refresh grant. Renewal is single-flight:
//! whichever check observes imminent expiry first performs the renewal and
//! every concurrent check skips. A failed renewal deauthenticates the session
//! immediately; it is never retried, because the refresh token is single-use
//! and was consumed by the failed attempt.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::TokenClientError;
use crate::session::SessionInner;
use crate::types::SessionTokens;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing has run yet.
    Uninitialized,
    /// Bootstrap is in progress; no verdict either way.
    Loading,
    /// A usable access token is in memory.
    Authenticated,
    /// A renewal is in flight; the previous token remains usable until it
    /// resolves.
    Renewing,
    /// No usable credentials. Terminal until the next login.
    Unauthenticated,
}

impl SessionPhase {
    /// Whether an access token is currently available for API calls.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::Renewing)
    }

    /// Whether the session has not yet reached a verdict.
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Loading)
    }
}

/// Observable session state published through the watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// Realm the session is scoped to; consumers invalidate on change.
    pub realm: String,
}

impl SessionSnapshot {
    /// Whether an access token is currently available.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.phase.is_authenticated()
    }

    /// Whether the session has not yet reached a verdict.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }
}

/// Monitor cadence and renewal policy.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the monitor inspects the session.
    pub check_interval: Duration,

    /// Renew when the access token expires within this window.
    pub renew_threshold: chrono::Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            renew_threshold: chrono::Duration::seconds(5),
        }
    }
}

/// Background loop driving `tick` until shutdown is signalled.
pub(crate) async fn run(inner: Arc<SessionInner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.monitor.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = inner.monitor.check_interval.as_secs(), "session monitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => tick(&inner).await,
            _ = shutdown.changed() => {
                info!("session monitor stopped");
                return;
            }
        }
    }
}

/// One monitor pass: inspect the session and renew if expiry is imminent.
///
/// Skips silently when another renewal already holds the gate.
pub(crate) async fn tick(inner: &SessionInner) {
    let Some(tokens) = inner.current_tokens().await else {
        return;
    };
    if !tokens.expires_within(inner.monitor.renew_threshold) {
        return;
    }

    let Ok(_gate) = inner.renew_gate.try_lock() else {
        debug!("renewal already in flight, skipping");
        return;
    };

    // Re-read under the gate: the previous holder may have replaced the
    // tokens while this tick was waiting to observe them.
    let Some(tokens) = inner.current_tokens().await else {
        return;
    };
    if !tokens.expires_within(inner.monitor.renew_threshold) {
        return;
    }

    let Some(refresh_token) = tokens.refresh_token.clone() else {
        warn!("access token expiring with no refresh token, ending session");
        inner.clear_session().await;
        return;
    };

    inner.set_phase(SessionPhase::Renewing);
    if renew_with(inner, &refresh_token).await.is_err() {
        inner.clear_session().await;
    }
}

/// Perform one renewal attempt and install the result.
///
/// The caller owns the gate and decides what a failure means; bootstrap keeps
/// the session in `Loading`, the monitor sets `Renewing` first.
pub(crate) async fn renew_with(
    inner: &SessionInner,
    refresh_token: &str,
) -> Result<(), TokenClientError> {
    match inner.endpoint.refresh(refresh_token).await {
        Ok(response) => {
            let tokens = SessionTokens::from_response(response, Some(refresh_token.to_string()));
            let expires_in = tokens.seconds_until_expiry();
            inner.install_tokens(tokens).await;
            info!(?expires_in, "session renewed");
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "session renewal failed");
            Err(err)
        }
    }
}
