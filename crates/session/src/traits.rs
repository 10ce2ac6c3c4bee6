//! Seams for persistence and the token endpoint
//!
//! These traits abstract the two external collaborators of the session core —
//! client-side persistence and the authorization server's token endpoint —
//! so tests can substitute in-memory and scripted implementations.

use async_trait::async_trait;

use crate::client::{CodeExchange, TokenClientError};
use crate::flow::PendingLogin;
use crate::store::StoreError;
use crate::types::{SessionTokens, TokenResponse};

/// Client-side persistence for the session aggregate and the ephemeral
/// pending-login state.
///
/// `save` must be atomic from the caller's perspective: a reader never
/// observes an access token without its companion fields. Persisted tokens
/// survive a restart; they do not survive `clear`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the persisted session, `None` when nothing is stored.
    async fn load(&self) -> Result<Option<SessionTokens>, StoreError>;

    /// Atomically replace the persisted session.
    async fn save(&self, tokens: &SessionTokens) -> Result<(), StoreError>;

    /// Remove all persisted session state. Idempotent.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Persist the pending login for the redirect round-trip.
    ///
    /// The browser instance is not guaranteed to survive the external
    /// redirect, so this state must outlive the process, not just the call.
    async fn save_pending_login(&self, pending: &PendingLogin) -> Result<(), StoreError>;

    /// Take (and destroy) the pending login. A second take returns `None`;
    /// the state is single-use by construction.
    async fn take_pending_login(&self) -> Result<Option<PendingLogin>, StoreError>;
}

/// The authorization server's token endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for tokens (`authorization_code` grant).
    async fn exchange_code(
        &self,
        request: CodeExchange<'_>,
    ) -> Result<TokenResponse, TokenClientError>;

    /// Obtain a fresh token pair (`refresh_token` grant). Never retried
    /// internally; a failure is terminal for the session.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TokenClientError>;
}
