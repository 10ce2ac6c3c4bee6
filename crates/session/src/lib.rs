//! Client-side authentication session management for the Castellan admin
//! console.
//!
//! This crate coordinates the OAuth 2.0 / OpenID Connect Authorization Code
//! flow and owns the resulting session for one realm: bootstrap from
//! persisted state, observable authentication flags, background token
//! renewal, and route guarding.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  SessionContext  │  Authoritative session state + observable flags
//! └────────┬─────────┘
//!          │
//!          ├──► LoginFlow       (two-phase Authorization Code flow)
//!          ├──► monitor         (fixed-cadence renewal loop)
//!          ├──► TokenClient     (RFC 6749 token endpoint HTTP)
//!          ├──► TokenStore      (persistence seam; FileTokenStore default)
//!          │
//!          ├──► RouteGuard      (navigation decisions off the flags)
//!          └──► ApiClient       (bearer-authenticated admin API calls)
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use castellan_session::{AuthConfig, FileTokenStore, SessionContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AuthConfig::new(
//!         "https://id.example.com/realms/master",
//!         "master",
//!         "admin-console",
//!         "https://console.example.com/auth/callback",
//!         vec!["openid".to_string()],
//!     );
//!     let store = Arc::new(FileTokenStore::new("/var/lib/console/session"));
//!     let session = SessionContext::new(config, store);
//!
//!     let snapshot = session.initialize().await;
//!     session.start_monitor();
//!
//!     if !snapshot.is_authenticated() {
//!         let request = session.begin_login().await.unwrap();
//!         println!("navigate to {}", request.url);
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod api;
pub mod claims;
pub mod client;
pub mod flow;
pub mod guard;
pub mod monitor;
pub mod pkce;
pub mod session;
pub mod store;
pub mod testing;
pub mod traits;
pub mod types;

pub use api::{ApiClient, ApiError};
pub use claims::Claims;
pub use client::{CodeExchange, TokenClient, TokenClientError};
pub use flow::{AuthorizeRequest, CallbackParams, FlowError, LoginFlow, PendingLogin};
pub use guard::{GuardDecision, RouteGuard};
pub use monitor::{MonitorConfig, SessionPhase, SessionSnapshot};
pub use session::{SessionContext, SessionError};
pub use store::{FileTokenStore, StoreError};
pub use traits::{TokenEndpoint, TokenStore};
pub use types::{AuthConfig, OAuthErrorBody, SessionTokens, TokenResponse};
