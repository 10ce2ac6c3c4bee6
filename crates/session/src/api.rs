//! Authenticated admin API client
//!
//! Thin HTTP wrapper that attaches the session's bearer token to every
//! request. It does not renew tokens itself; the lifecycle monitor keeps the
//! session fresh and this client just reads whatever is current.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::session::SessionContext;

/// Error type for admin API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No authenticated session to draw a bearer token from.
    #[error("not authenticated")]
    NotAuthenticated,

    /// HTTP request failed before a response was produced.
    #[error("api request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("api returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Admin API client bound to one session.
pub struct ApiClient {
    base_url: String,
    session: Arc<SessionContext>,
    http: Client,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, session: Arc<SessionContext>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { base_url: base_url.into(), session, http }
    }

    /// GET a resource and decode the JSON body.
    ///
    /// # Errors
    /// Returns an error when unauthenticated, on transport failure, or on a
    /// non-success status.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.authed(self.http.get(self.url(path))).await?.send().await?;
        Self::decode(response).await
    }

    /// POST a JSON body and decode the JSON response.
    ///
    /// # Errors
    /// Returns an error when unauthenticated, on transport failure, or on a
    /// non-success status.
    pub async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response =
            self.authed(self.http.post(self.url(path))).await?.json(body).send().await?;
        Self::decode(response).await
    }

    /// DELETE a resource, discarding any response body.
    ///
    /// # Errors
    /// Returns an error when unauthenticated, on transport failure, or on a
    /// non-success status.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.authed(self.http.delete(self.url(path))).await?.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Status { status: status.as_u16(), body })
        }
    }

    async fn authed(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ApiError> {
        let token = self.session.access_token().await.ok_or(ApiError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "api request rejected");
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for api.
    use super::*;
    use crate::testing::{MemoryTokenStore, MockTokenEndpoint};
    use crate::types::AuthConfig;

    fn test_session() -> Arc<SessionContext> {
        Arc::new(SessionContext::with_endpoint(
            AuthConfig::new(
                "https://id.example.com/realms/acme",
                "acme",
                "admin-console",
                "https://console.example.com/callback",
                vec!["openid".to_string()],
            ),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MockTokenEndpoint::new()),
        ))
    }

    #[tokio::test]
    async fn requests_without_a_session_fail_before_any_io() {
        let client = ApiClient::new("https://console.example.com/admin", test_session());
        let result: Result<serde_json::Value, _> = client.get("/realms/acme/users").await;
        assert!(matches!(result, Err(ApiError::NotAuthenticated)));
    }

    #[test]
    fn url_joining_normalizes_slashes() {
        let client = ApiClient::new("https://host/admin/", test_session());
        assert_eq!(client.url("/users"), "https://host/admin/users");
        assert_eq!(client.url("users"), "https://host/admin/users");
    }
}
