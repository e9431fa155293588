//! Bullhorn REST authentication
//!
//! This crate turns API-user credentials into a ready-to-use REST session.
//!
//! # Authentication Flow
//!
//! 1. Credentials are posted to the OAuth authorize endpoint of the account's
//!    cluster; the redirect carries an authorization code. A `307` means the
//!    account lives on another cluster and the form is re-posted there once.
//! 2. The code is exchanged for an access token.
//! 3. The access token opens a REST session (`BhRestToken` + `restUrl`).
//! 4. Optionally, `ping` reports when that session expires.
//!
//! # Example
//!
//! ```no_run
//! use bh_auth::{BhAuthConfig, Credentials, RequestSpec, RestClient, TokenAcquirer};
//!
//! # async fn example() -> bh_auth::Result<()> {
//! let acquirer = TokenAcquirer::new(BhAuthConfig::default())?;
//! let credentials = Credentials::new("api.user", "password", "client-id", "client-secret");
//!
//! let session = acquirer.acquire_with_expiry(&credentials, 2880).await?;
//! println!("Session valid until {:?}", session.expires_at());
//!
//! let rest = RestClient::new(acquirer.http().clone(), session);
//! let candidate = rest.send(RequestSpec::get("entity/Candidate/1").query("fields", "id")).await?;
//! println!("{candidate}");
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).ok();
//! ```
//!
//! # Important Notes
//!
//! - A new API client id must be authorized once by a human in a browser; until
//!   then every login fails at the authorization code step. The error message
//!   carries the URL to open.
//! - Tokens are never logged and credentials redact themselves in `Debug` output.

pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod probe;
pub mod rest;
pub mod session;

// Re-export main types
pub use client::TokenAcquirer;
pub use config::{AuthEndpoints, BhAuthConfig, HttpTimeouts, DEFAULT_CLUSTER, DEFAULT_SESSION_TTL_MINUTES};
pub use errors::{AuthStep, BhAuthError, Result, StepError};
pub use probe::SessionExpiryProbe;
pub use rest::{RequestSpec, RestClient};
pub use session::{Credentials, Session};
