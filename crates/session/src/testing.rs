//! Test doubles and token fabrication helpers
//!
//! In-memory implementations of the persistence and token endpoint seams,
//! plus helpers for minting unsigned compact tokens with chosen claims.
//! Compiled into the library so integration tests and downstream consumers
//! can drive the session without a real authorization server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;

use crate::client::{CodeExchange, TokenClientError};
use crate::flow::PendingLogin;
use crate::store::StoreError;
use crate::traits::{TokenEndpoint, TokenStore};
use crate::types::{OAuthErrorBody, SessionTokens, TokenResponse};

/// Build an unsigned compact token carrying the given JSON claims.
///
/// The shape is header.payload.signature with a throwaway signature; claims
/// decoding never verifies, so this is indistinguishable from a real token
/// for everything the session does.
#[must_use]
pub fn encode_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "none", "typ": "JWT" }).to_string());
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}

/// Build a token whose `exp` claim lands `seconds` from now.
#[must_use]
pub fn token_expiring_in(seconds: i64) -> String {
    let now = Utc::now().timestamp();
    encode_token(&json!({
        "exp": now + seconds,
        "iat": now,
        "sub": "test-subject",
        "iss": "https://id.example.com/realms/acme",
    }))
}

/// In-memory token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<SessionTokens>>,
    pending: Mutex<Option<PendingLogin>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, as if a previous run had persisted a session.
    pub async fn seed(&self, tokens: SessionTokens) {
        *self.tokens.lock().await = Some(tokens);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<SessionTokens>, StoreError> {
        let mut tokens = self.tokens.lock().await.clone();
        if let Some(tokens) = tokens.as_mut() {
            tokens.rederive_expiry();
        }
        Ok(tokens)
    }

    async fn save(&self, tokens: &SessionTokens) -> Result<(), StoreError> {
        *self.tokens.lock().await = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.tokens.lock().await = None;
        *self.pending.lock().await = None;
        Ok(())
    }

    async fn save_pending_login(&self, pending: &PendingLogin) -> Result<(), StoreError> {
        *self.pending.lock().await = Some(pending.clone());
        Ok(())
    }

    async fn take_pending_login(&self) -> Result<Option<PendingLogin>, StoreError> {
        Ok(self.pending.lock().await.take())
    }
}

/// Scriptable token endpoint double with call counters.
///
/// Successful responses carry a five-minute access token and a rotated
/// refresh token. Failures answer with an RFC 6749 `invalid_grant` body, the
/// same way a server rejects a consumed or revoked credential.
#[derive(Default)]
pub struct MockTokenEndpoint {
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    fail_exchange: AtomicBool,
    fail_refresh: AtomicBool,
    delay: StdMutex<Option<Duration>>,
}

impl MockTokenEndpoint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent code exchange fail with `invalid_grant`.
    pub fn fail_exchanges(&self) {
        self.fail_exchange.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent refresh fail with `invalid_grant`.
    pub fn fail_refreshes(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    /// Stall every request by `delay`, to widen concurrency windows.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Number of code exchanges performed.
    #[must_use]
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    /// Number of refresh grants performed.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn configured_delay(&self) -> Option<Duration> {
        self.delay.lock().ok().and_then(|slot| *slot)
    }

    fn success_response() -> TokenResponse {
        TokenResponse {
            access_token: token_expiring_in(300),
            refresh_token: Some("rotated-refresh-token".to_string()),
            id_token: Some(token_expiring_in(300)),
            token_type: "Bearer".to_string(),
            expires_in: Some(300),
            scope: Some("openid".to_string()),
            session_state: None,
        }
    }

    fn invalid_grant() -> TokenClientError {
        TokenClientError::Server(OAuthErrorBody {
            error: "invalid_grant".to_string(),
            error_description: Some("credential rejected".to_string()),
        })
    }
}

#[async_trait]
impl TokenEndpoint for MockTokenEndpoint {
    async fn exchange_code(
        &self,
        _request: CodeExchange<'_>,
    ) -> Result<TokenResponse, TokenClientError> {
        if let Some(delay) = self.configured_delay() {
            tokio::time::sleep(delay).await;
        }
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(Self::invalid_grant());
        }
        Ok(Self::success_response())
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, TokenClientError> {
        if let Some(delay) = self.configured_delay() {
            tokio::time::sleep(delay).await;
        }
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Self::invalid_grant());
        }
        Ok(Self::success_response())
    }
}
