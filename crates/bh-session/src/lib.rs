//! Session lifecycle on top of `bh-auth`
//!
//! Two ways to hold a Bullhorn REST session:
//!
//! - [`CachingSessionClient`] logs in on demand and serves the session from a
//!   30 minute cache; concurrent cache misses share a single login.
//! - [`ManagedSessionClient`] keeps one session for the whole process, replaces
//!   it once less than six hours remain, and can run a background refresh loop.
//!   Logins and failures are published as [`SessionEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use bh_auth::{BhAuthConfig, Credentials, RequestSpec, TokenAcquirer};
//! use bh_session::{ManagedSessionClient, SessionEvent};
//!
//! # async fn example() -> bh_auth::Result<()> {
//! let acquirer = TokenAcquirer::new(BhAuthConfig::default())?;
//! let credentials = Credentials::new("api.user", "password", "client-id", "client-secret");
//! let client = ManagedSessionClient::new(acquirer, credentials);
//!
//! let mut events = client.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::LoginFailed(e) = event {
//!             eprintln!("refresh failed: {e}");
//!         }
//!     }
//! });
//!
//! client.start_refresh_loop().await?;
//! let settings = client.issue_request(RequestSpec::get("settings/userId")).await?;
//! println!("{settings}");
//! client.stop_refresh_loop();
//! # Ok(())
//! # }
//! ```

pub mod caching;
pub mod events;
pub mod managed;
mod refresh;

pub use caching::{CacheEntry, CachingOptions, CachingSessionClient, DEFAULT_CACHE_TTL};
pub use events::SessionEvent;
pub use managed::{
    LoginState, ManagedOptions, ManagedSessionClient, DEFAULT_REFRESH_INTERVAL,
    DEFAULT_REFRESH_MARGIN,
};
