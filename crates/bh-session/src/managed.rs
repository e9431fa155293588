//! Long-lived REST session with proactive, expiry-driven refresh.
//!
//! # Invariants
//! - Only [`ManagedSessionClient::login`] replaces the session; readers never
//!   wait for a login in progress and keep using the previous session meanwhile.
//! - A failed login leaves the previous session and logged-in flag untouched
//!   and is reported through exactly one [`SessionEvent::LoginFailed`].
//! - At most one refresh loop runs per client.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bh_auth::{
    BhAuthError, Credentials, RequestSpec, RestClient, Result, Session, TokenAcquirer,
    DEFAULT_SESSION_TTL_MINUTES,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::events::{EventBus, SessionEvent};
use crate::refresh::RefreshLoop;

/// Remaining lifetime below which `login` acquires a new session
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(6 * 60 * 60);

/// Cadence of the background refresh loop
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct ManagedOptions {
    /// Lifetime requested from the REST login, in minutes
    pub session_ttl_minutes: u32,
    /// A session expiring sooner than this is replaced on the next login
    pub refresh_margin: Duration,
    /// How often the refresh loop calls login
    pub refresh_interval: Duration,
}

impl Default for ManagedOptions {
    fn default() -> Self {
        Self {
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Observable login state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

#[derive(Debug, Default)]
struct ManagedState {
    session: Option<Session>,
    logged_in: bool,
    logging_in: bool,
}

#[derive(Debug)]
struct Inner {
    acquirer: TokenAcquirer,
    credentials: Credentials,
    options: ManagedOptions,
    state: RwLock<ManagedState>,
    login_gate: tokio::sync::Mutex<()>,
    events: EventBus,
    refresh_loop: Mutex<Option<RefreshLoop>>,
}

/// Keeps one REST session alive for the lifetime of the application
#[derive(Debug, Clone)]
pub struct ManagedSessionClient {
    inner: Arc<Inner>,
}

impl ManagedSessionClient {
    pub fn new(acquirer: TokenAcquirer, credentials: Credentials) -> Self {
        Self::with_options(acquirer, credentials, ManagedOptions::default())
    }

    pub fn with_options(
        acquirer: TokenAcquirer,
        credentials: Credentials,
        options: ManagedOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                acquirer,
                credentials,
                options,
                state: RwLock::new(ManagedState::default()),
                login_gate: tokio::sync::Mutex::new(()),
                events: EventBus::new(),
                refresh_loop: Mutex::new(None),
            }),
        }
    }

    /// Receive `login` / `loginFailed` notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Make sure a session with enough lifetime left is in place
    ///
    /// Returns immediately when the current session outlives the refresh
    /// margin; otherwise logs in again and probes the new session's expiry.
    #[instrument(skip(self), fields(username = %self.inner.credentials.username))]
    pub async fn login(&self) -> Result<Session> {
        if let Some(session) = self.session_outliving_margin() {
            debug!(expires_at = ?session.expires_at(), "Session still valid beyond refresh margin");
            return Ok(session);
        }

        let _gate = self.inner.login_gate.lock().await;

        // A concurrent login may have finished while we waited
        if let Some(session) = self.session_outliving_margin() {
            return Ok(session);
        }

        let in_flight = LoggingIn::begin(&self.inner.state);
        let result = self
            .inner
            .acquirer
            .acquire_with_expiry(&self.inner.credentials, self.inner.options.session_ttl_minutes)
            .await;
        drop(in_flight);

        match result {
            Ok(session) => {
                {
                    let mut state = self.write_state();
                    state.session = Some(session.clone());
                    state.logged_in = true;
                }
                info!(expires_at = ?session.expires_at(), "Logged in");
                self.inner.events.emit(SessionEvent::Login(session.clone()));
                Ok(session)
            }
            Err(e) => {
                error!("Login failed: {}", e);
                self.inner.events.emit(SessionEvent::LoginFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// Liveness call with the current session; reports the server-side expiry
    pub async fn ping(&self) -> Result<DateTime<Utc>> {
        self.client()?.ping().await
    }

    /// Call the REST API with whatever session is current right now
    pub async fn issue_request(&self, spec: RequestSpec) -> Result<Value> {
        self.client()?.send(spec).await
    }

    /// REST client bound to the current session
    pub fn client(&self) -> Result<RestClient> {
        let session = self.session().ok_or(BhAuthError::NotLoggedIn)?;
        Ok(RestClient::new(self.inner.acquirer.http().clone(), session))
    }

    /// Log in now, then keep the session fresh every refresh interval
    ///
    /// A failing initial login is reported through the event channel only;
    /// the loop is installed either way and retries on its next tick.
    #[instrument(skip(self), fields(username = %self.inner.credentials.username))]
    pub async fn start_refresh_loop(&self) -> Result<()> {
        let period = self.inner.options.refresh_interval;
        if period.is_zero() {
            return Err(BhAuthError::Config("refresh interval must be positive".to_string()));
        }

        {
            let mut refresh_loop = self.lock_refresh_loop();
            if refresh_loop.is_some() {
                return Err(BhAuthError::AlreadyRunning);
            }

            let weak = Arc::downgrade(&self.inner);
            *refresh_loop = Some(RefreshLoop::spawn(period, move || {
                let weak = weak.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return ControlFlow::Break(());
                    };
                    let client = ManagedSessionClient { inner };
                    if let Err(e) = client.login().await {
                        warn!("Scheduled refresh failed, keeping previous session: {}", e);
                    }
                    ControlFlow::Continue(())
                }
            }));
        }
        info!(interval_secs = period.as_secs(), "Refresh loop started");

        if let Err(e) = self.login().await {
            warn!("Initial login failed, refresh loop will retry: {}", e);
        }
        Ok(())
    }

    /// Stop scheduling refreshes; a login already running still completes
    pub fn stop_refresh_loop(&self) {
        if self.lock_refresh_loop().take().is_some() {
            info!("Refresh loop stopped");
        }
    }

    pub fn is_refresh_loop_running(&self) -> bool {
        self.lock_refresh_loop().is_some()
    }

    pub fn session(&self) -> Option<Session> {
        self.read_state().session.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.read_state().logged_in
    }

    pub fn state(&self) -> LoginState {
        let state = self.read_state();
        if state.logging_in {
            LoginState::LoggingIn
        } else if state.logged_in {
            LoginState::LoggedIn
        } else {
            LoginState::LoggedOut
        }
    }

    fn session_outliving_margin(&self) -> Option<Session> {
        let margin = chrono::Duration::from_std(self.inner.options.refresh_margin).ok()?;
        let threshold = Utc::now().checked_add_signed(margin)?;
        self.session().filter(|session| session.valid_beyond(threshold))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ManagedState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ManagedState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_refresh_loop(&self) -> MutexGuard<'_, Option<RefreshLoop>> {
        self.inner
            .refresh_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks a login as in flight until dropped, including when the caller is cancelled
struct LoggingIn<'a> {
    state: &'a RwLock<ManagedState>,
}

impl<'a> LoggingIn<'a> {
    fn begin(state: &'a RwLock<ManagedState>) -> Self {
        state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .logging_in = true;
        Self { state }
    }
}

impl Drop for LoggingIn<'_> {
    fn drop(&mut self) {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .logging_in = false;
    }
}
