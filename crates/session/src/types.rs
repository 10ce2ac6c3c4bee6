//! Core session types and configuration
//!
//! Defines the persisted token aggregate, the wire format of the token
//! endpoint, and the static per-deployment authentication configuration.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims;

/// Static authentication configuration for one console deployment.
///
/// Everything here is deployment configuration, not user data: the issuer and
/// realm identify the tenant, the client identity is fixed per deployment,
/// and the redirect URI points back into the console.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Issuer base URL (e.g. "https://id.example.com/realms/master").
    /// The authorize and token endpoints hang off this base.
    pub issuer: String,

    /// Realm (tenant) this session is scoped to. Sessions in different
    /// realms are independent.
    pub realm: String,

    /// OAuth client ID registered for the console.
    pub client_id: String,

    /// Client secret for confidential deployments. Public (browser-style)
    /// deployments leave this unset and rely on PKCE.
    pub client_secret: Option<String>,

    /// Redirect URI the authorization server sends the browser back to.
    pub redirect_uri: String,

    /// Scopes requested during authorization.
    pub scopes: Vec<String>,

    /// Attach a PKCE challenge to the authorization request (RFC 7636).
    pub use_pkce: bool,

    /// Fail the code exchange when no session-correlation value is supplied,
    /// instead of silently proceeding without one.
    pub require_session_correlation: bool,
}

impl AuthConfig {
    /// Create a configuration with the defaults appropriate for a public
    /// client: PKCE on, no client secret, correlation optional.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes,
            use_pkce: true,
            require_session_correlation: false,
        }
    }

    /// Authorization endpoint: `{issuer}/authorize`.
    #[must_use]
    pub fn authorization_url(&self) -> String {
        format!("{}/authorize", self.issuer.trim_end_matches('/'))
    }

    /// Token endpoint: `{issuer}/token`.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/token", self.issuer.trim_end_matches('/'))
    }

    /// Requested scopes as a space-separated string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// The persisted session aggregate: bearer credentials plus derived expiry.
///
/// `expires_at` is never settable independently. It is always recomputed from
/// the access token's decoded `exp` claim and is `None` when the token does
/// not decode, which callers treat as "expiry unknown".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Opaque bearer credential attached to every authenticated API call.
    pub access_token: String,

    /// Credential usable once per renewal to obtain a fresh token pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token issued alongside the access token (OpenID Connect).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Token type, "Bearer" for everything this console talks to.
    pub token_type: String,

    /// Derived expiry instant, recomputed from the access token claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes (space-separated), when the server reports them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl SessionTokens {
    /// Build a token set from raw credentials, deriving expiry from the
    /// access token's claims.
    #[must_use]
    pub fn new(access_token: String, refresh_token: Option<String>) -> Self {
        let expires_at = claims::expiry_of(&access_token);
        Self {
            access_token,
            refresh_token,
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_at,
            scope: None,
        }
    }

    /// Build a token set from a token endpoint response.
    ///
    /// When the server does not rotate the refresh token, `previous_refresh`
    /// carries the prior one forward so the session stays renewable.
    #[must_use]
    pub fn from_response(response: TokenResponse, previous_refresh: Option<String>) -> Self {
        let expires_at = claims::expiry_of(&response.access_token);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            id_token: response.id_token,
            token_type: response.token_type,
            expires_at,
            scope: response.scope,
        }
    }

    /// Recompute `expires_at` from the current access token.
    ///
    /// Called after hydration so a stale persisted expiry can never outlive
    /// the token it was derived from.
    pub fn rederive_expiry(&mut self) {
        self.expires_at = claims::expiry_of(&self.access_token);
    }

    /// Whether the access token is expired or expires within `threshold`.
    ///
    /// Unknown expiry reads as "not expiring": the resource server, not this
    /// client, is the authority on token validity.
    #[must_use]
    pub fn expires_within(&self, threshold: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + threshold >= expires_at,
            None => false,
        }
    }

    /// Seconds until expiry, or `None` when the expiry is unknown.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

/// Token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: String,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    /// Server-side session identifier some providers echo back.
    pub session_state: Option<String>,
}

/// Token endpoint error response (RFC 6749 §5.2).
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for types.
    use super::*;
    use crate::testing::token_expiring_in;

    fn sample_config() -> AuthConfig {
        AuthConfig::new(
            "https://id.example.com/realms/master",
            "master",
            "admin-console",
            "https://console.example.com/callback",
            vec!["openid".to_string(), "profile".to_string()],
        )
    }

    #[test]
    fn endpoint_urls_from_issuer() {
        let config = sample_config();
        assert_eq!(config.authorization_url(), "https://id.example.com/realms/master/authorize");
        assert_eq!(config.token_url(), "https://id.example.com/realms/master/token");
        assert_eq!(config.scope_string(), "openid profile");
    }

    #[test]
    fn trailing_slash_in_issuer_is_tolerated() {
        let mut config = sample_config();
        config.issuer = "https://id.example.com/realms/master/".to_string();
        assert_eq!(config.token_url(), "https://id.example.com/realms/master/token");
    }

    #[test]
    fn expiry_derived_from_access_token_claims() {
        let tokens = SessionTokens::new(token_expiring_in(120), None);
        let seconds = tokens.seconds_until_expiry().unwrap();
        assert!((118..=120).contains(&seconds), "unexpected expiry distance: {seconds}");
    }

    #[test]
    fn undecodable_token_has_unknown_expiry() {
        let tokens = SessionTokens::new("not-a-jwt".to_string(), None);
        assert!(tokens.expires_at.is_none());
        assert!(tokens.seconds_until_expiry().is_none());
        // Unknown expiry never triggers renewal on its own.
        assert!(!tokens.expires_within(chrono::Duration::seconds(300)));
    }

    #[test]
    fn from_response_keeps_prior_refresh_token_when_not_rotated() {
        let response = TokenResponse {
            access_token: token_expiring_in(60),
            refresh_token: None,
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_in: Some(60),
            scope: None,
            session_state: None,
        };
        let tokens = SessionTokens::from_response(response, Some("prior-refresh".to_string()));
        assert_eq!(tokens.refresh_token.as_deref(), Some("prior-refresh"));
    }

    #[test]
    fn from_response_prefers_rotated_refresh_token() {
        let response = TokenResponse {
            access_token: token_expiring_in(60),
            refresh_token: Some("rotated".to_string()),
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_in: Some(60),
            scope: None,
            session_state: None,
        };
        let tokens = SessionTokens::from_response(response, Some("prior".to_string()));
        assert_eq!(tokens.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn expires_within_threshold() {
        let tokens = SessionTokens::new(token_expiring_in(3), Some("refresh".to_string()));
        assert!(tokens.expires_within(chrono::Duration::seconds(5)));
        assert!(!tokens.expires_within(chrono::Duration::seconds(1)));
    }

    #[test]
    fn rederive_expiry_overrides_stale_value() {
        let mut tokens = SessionTokens::new(token_expiring_in(60), None);
        tokens.expires_at = Some(Utc::now() + chrono::Duration::days(365));
        tokens.rederive_expiry();
        let seconds = tokens.seconds_until_expiry().unwrap();
        assert!(seconds <= 60);
    }

    #[test]
    fn oauth_error_display() {
        let body = OAuthErrorBody {
            error: "invalid_grant".to_string(),
            error_description: Some("refresh token revoked".to_string()),
        };
        assert_eq!(body.to_string(), "invalid_grant: refresh token revoked");

        let bare = OAuthErrorBody { error: "invalid_request".to_string(), error_description: None };
        assert_eq!(bare.to_string(), "invalid_request");
    }
}
