//! Authorization Code flow coordinator
//!
//! Drives the redirect-based login as a two-phase protocol. Phase one builds
//! the authorization URL and persists the anti-forgery state; the redirect
//! then ends this page's lifetime. Phase two runs on return to the redirect
//! URI: it consumes the persisted state, validates the callback, and
//! exchanges the code for tokens.
//!
//! The pending state is destroyed on every outcome — success, mismatch, or
//! missing code — so one authorization attempt can never be replayed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::client::{CodeExchange, TokenClientError};
use crate::pkce::{self, PkcePair};
use crate::store::StoreError;
use crate::traits::{TokenEndpoint, TokenStore};
use crate::types::{AuthConfig, SessionTokens};

/// Error type for the login flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The callback arrived without a `code`. No token endpoint call is made.
    #[error("callback is missing the authorization code")]
    MissingCode,

    /// The callback arrived but no login was pending (state already consumed
    /// or never created).
    #[error("no pending login for this callback")]
    NoPendingLogin,

    /// The callback `state` does not match the persisted one.
    #[error("state mismatch: expected {expected}, received {received}")]
    StateMismatch { expected: String, received: String },

    /// The identity provider reported an error on the callback.
    #[error("authorization was denied: {0}")]
    Denied(String),

    /// No session-correlation value was supplied and the configuration
    /// requires one.
    #[error("session correlation value missing")]
    MissingCorrelation,

    /// The callback URL could not be parsed.
    #[error("callback URL unreadable: {0}")]
    InvalidCallback(String),

    /// The code exchange failed.
    #[error(transparent)]
    Token(#[from] TokenClientError),

    /// Persisting or consuming the pending state failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ephemeral state persisted between the two phases of one login attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Single-use anti-forgery correlation value.
    pub state: String,

    /// PKCE verifier, present when the deployment uses PKCE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,

    /// When the attempt started.
    pub created_at: DateTime<Utc>,
}

/// The authorization request produced by phase one.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Fully assembled authorization URL; the caller navigates the browser
    /// here (a full redirect, not a background request).
    pub url: String,

    /// The `state` value embedded in the URL, exposed for tests and logging.
    pub state: String,
}

/// Query parameters read off the redirect callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Extract the relevant parameters from a parsed callback URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// Parse a raw callback URL string.
    ///
    /// # Errors
    /// Returns `FlowError::InvalidCallback` when the URL does not parse.
    pub fn parse(callback_url: &str) -> Result<Self, FlowError> {
        let url =
            Url::parse(callback_url).map_err(|err| FlowError::InvalidCallback(err.to_string()))?;
        Ok(Self::from_url(&url))
    }
}

/// Two-phase Authorization Code flow coordinator.
pub struct LoginFlow {
    config: AuthConfig,
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl LoginFlow {
    /// Create a coordinator over the given persistence and token endpoint.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self { config, store, endpoint }
    }

    /// Phase one: persist fresh single-use state and build the authorization
    /// URL.
    ///
    /// # Errors
    /// Returns an error if the pending state cannot be persisted.
    pub async fn begin(&self) -> Result<AuthorizeRequest, FlowError> {
        let state = pkce::random_state();
        let pair = self.config.use_pkce.then(PkcePair::generate);

        let pending = PendingLogin {
            state: state.clone(),
            code_verifier: pair.as_ref().map(|p| p.verifier.clone()),
            created_at: Utc::now(),
        };
        self.store.save_pending_login(&pending).await?;

        let url = authorize_url(&self.config, &state, pair.as_ref());
        info!(realm = %self.config.realm, "authorization request prepared");
        Ok(AuthorizeRequest { url, state })
    }

    /// Phase two: validate the callback and exchange the code for tokens.
    ///
    /// The pending login is consumed before anything else, so the state is
    /// gone whether this succeeds or fails.
    ///
    /// # Errors
    /// Returns an error if the code is missing, the state does not match,
    /// the correlation policy fails closed, or the exchange is rejected.
    pub async fn complete(
        &self,
        params: &CallbackParams,
        correlation: Option<&str>,
    ) -> Result<SessionTokens, FlowError> {
        let pending = self.store.take_pending_login().await?;

        if let Some(error) = &params.error {
            warn!(error = %error, "identity provider reported authorization failure");
            return Err(FlowError::Denied(error.clone()));
        }

        // A callback without a code never reaches the token endpoint.
        let Some(code) = params.code.as_deref() else {
            warn!("callback arrived without an authorization code");
            return Err(FlowError::MissingCode);
        };

        let pending = pending.ok_or(FlowError::NoPendingLogin)?;
        let received = params.state.as_deref().unwrap_or_default();
        if pending.state != received {
            warn!("callback state does not match pending login");
            return Err(FlowError::StateMismatch {
                expected: pending.state,
                received: received.to_string(),
            });
        }

        if self.config.require_session_correlation && correlation.is_none() {
            return Err(FlowError::MissingCorrelation);
        }

        let response = self
            .endpoint
            .exchange_code(CodeExchange {
                code,
                code_verifier: pending.code_verifier.as_deref(),
                session_correlation: correlation,
            })
            .await?;

        info!(realm = %self.config.realm, "authorization code exchanged");
        Ok(SessionTokens::from_response(response, None))
    }
}

/// Assemble the authorization URL for a login attempt.
fn authorize_url(config: &AuthConfig, state: &str, pair: Option<&PkcePair>) -> String {
    let mut params = vec![
        ("response_type", "code".to_string()),
        ("client_id", config.client_id.clone()),
        ("redirect_uri", config.redirect_uri.clone()),
        ("scope", config.scope_string()),
        ("state", state.to_string()),
    ];
    if let Some(pair) = pair {
        params.push(("code_challenge", pair.challenge.clone()));
        params.push(("code_challenge_method", PkcePair::method().to_string()));
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", config.authorization_url(), query)
}
