//! Token endpoint HTTP client
//!
//! Speaks RFC 6749 to `{issuer}/token`: authorization-code exchange, refresh
//! grants, and the direct grants (`password`, `client_credentials`) used by
//! tooling and service accounts. Errors are surfaced to the caller without
//! internal retries — the session monitor decides what a failure means.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::traits::TokenEndpoint;
use crate::types::{AuthConfig, OAuthErrorBody, TokenResponse};

/// Error type for token endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum TokenClientError {
    /// HTTP request failed before a response was produced.
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an RFC 6749 error body.
    #[error("token endpoint rejected request: {0}")]
    Server(OAuthErrorBody),

    /// The response body could not be interpreted.
    #[error("token response unreadable: {0}")]
    Parse(String),

    /// A refresh was requested with an empty refresh token.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The configuration cannot satisfy the request.
    #[error("token client misconfigured: {0}")]
    Config(String),
}

/// Parameters for an authorization-code exchange.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    /// Authorization code from the redirect callback.
    pub code: &'a str,

    /// PKCE verifier from the pending login, when PKCE is in use.
    pub code_verifier: Option<&'a str>,

    /// Session-correlation value read from the identity-provider cookie.
    pub session_correlation: Option<&'a str>,
}

/// HTTP client for the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    config: AuthConfig,
    http: Client,
}

impl TokenClient {
    /// Create a client for the configured issuer.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, http }
    }

    /// The configuration this client operates under.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    async fn post_token(
        &self,
        grant_type: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<TokenResponse, TokenClientError> {
        params.push(("grant_type", grant_type.to_string()));
        params.push(("client_id", self.config.client_id.clone()));
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.clone()));
        }

        debug!(grant_type, endpoint = %self.config.token_url(), "requesting tokens");
        let response = self.http.post(self.config.token_url()).form(&params).send().await?;

        if !response.status().is_success() {
            let body: OAuthErrorBody = response
                .json()
                .await
                .map_err(|err| TokenClientError::Parse(err.to_string()))?;
            return Err(TokenClientError::Server(body));
        }

        response.json().await.map_err(|err| TokenClientError::Parse(err.to_string()))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    /// Returns an error if the request fails, the server rejects the code,
    /// or the response cannot be parsed.
    pub async fn exchange_code(
        &self,
        request: CodeExchange<'_>,
    ) -> Result<TokenResponse, TokenClientError> {
        let mut params = vec![
            ("code", request.code.to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
        ];
        if let Some(verifier) = request.code_verifier {
            params.push(("code_verifier", verifier.to_string()));
        }
        if let Some(correlation) = request.session_correlation {
            params.push(("client_session_state", correlation.to_string()));
        }
        self.post_token("authorization_code", params).await
    }

    /// Obtain a fresh token pair from a refresh token.
    ///
    /// # Errors
    /// Returns an error if the refresh token is empty or the grant fails.
    /// Failures are not retried; refresh tokens are single-use and a blind
    /// retry would replay a consumed credential.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TokenClientError> {
        if refresh_token.is_empty() {
            return Err(TokenClientError::NoRefreshToken);
        }
        self.post_token("refresh_token", vec![("refresh_token", refresh_token.to_string())]).await
    }

    /// Resource Owner Password grant, for tooling against trusted realms.
    ///
    /// # Errors
    /// Returns an error if the request fails or the credentials are rejected.
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, TokenClientError> {
        let params = vec![
            ("username", username.to_string()),
            ("password", password.to_string()),
            ("scope", self.config.scope_string()),
        ];
        self.post_token("password", params).await
    }

    /// Client Credentials grant, for service accounts.
    ///
    /// # Errors
    /// Returns an error if no client secret is configured or the grant fails.
    pub async fn client_credentials(&self) -> Result<TokenResponse, TokenClientError> {
        if self.config.client_secret.is_none() {
            return Err(TokenClientError::Config(
                "client_credentials grant requires a client secret".to_string(),
            ));
        }
        self.post_token("client_credentials", vec![("scope", self.config.scope_string())]).await
    }
}

#[async_trait]
impl TokenEndpoint for TokenClient {
    async fn exchange_code(
        &self,
        request: CodeExchange<'_>,
    ) -> Result<TokenResponse, TokenClientError> {
        Self::exchange_code(self, request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TokenClientError> {
        Self::refresh(self, refresh_token).await
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for client.
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig::new(
            "https://id.example.com/realms/acme",
            "acme",
            "admin-console",
            "https://console.example.com/callback",
            vec!["openid".to_string()],
        )
    }

    #[tokio::test]
    async fn refresh_with_empty_token_is_rejected_locally() {
        let client = TokenClient::new(test_config());
        let result = client.refresh("").await;
        assert!(matches!(result, Err(TokenClientError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn client_credentials_requires_a_secret() {
        let client = TokenClient::new(test_config());
        let result = client.client_credentials().await;
        assert!(matches!(result, Err(TokenClientError::Config(_))));
    }

    #[test]
    fn config_is_exposed() {
        let client = TokenClient::new(test_config());
        assert_eq!(client.config().client_id, "admin-console");
        assert_eq!(client.config().realm, "acme");
    }
}
