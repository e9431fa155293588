//! Time-boxed session cache with single-flight acquisition.
//!
//! Every [`CachingSessionClient::get_client`] call that misses the cache
//! attaches to the one acquisition in flight, so a burst of callers costs a
//! single login and all of them see the same session or the same error.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bh_auth::{Credentials, RestClient, Result, Session, TokenAcquirer, DEFAULT_SESSION_TTL_MINUTES};
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

/// How long an acquired session is handed out before a fresh login
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct CachingOptions {
    /// Lifetime requested from the REST login, in minutes
    pub session_ttl_minutes: u32,
    /// How long a session is served from cache
    pub cache_ttl: Duration,
}

impl Default for CachingOptions {
    fn default() -> Self {
        Self {
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// A cached session and the instant it stops being served
#[derive(Debug, Clone)]
pub struct CacheEntry {
    session: Session,
    valid_until: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(session: Session, acquired_at: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let valid_until = acquired_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            session,
            valid_until,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

type Attempt = Arc<OnceCell<Result<Session>>>;

#[derive(Debug, Default)]
struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<Attempt>,
}

#[derive(Debug)]
struct Inner {
    acquirer: TokenAcquirer,
    credentials: Credentials,
    options: CachingOptions,
    slot: Mutex<Slot>,
}

/// Hands out REST clients, logging in at most once per cache period
#[derive(Debug, Clone)]
pub struct CachingSessionClient {
    inner: Arc<Inner>,
}

impl CachingSessionClient {
    pub fn new(acquirer: TokenAcquirer, credentials: Credentials) -> Self {
        Self::with_options(acquirer, credentials, CachingOptions::default())
    }

    pub fn with_options(
        acquirer: TokenAcquirer,
        credentials: Credentials,
        options: CachingOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                acquirer,
                credentials,
                options,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// A REST client for the cached session, logging in first when needed
    #[instrument(skip(self), fields(username = %self.inner.credentials.username))]
    pub async fn get_client(&self) -> Result<RestClient> {
        let attempt = {
            let mut slot = self.lock_slot();

            if let Some(entry) = &slot.entry {
                if entry.is_fresh_at(Utc::now()) {
                    debug!("Serving cached REST session");
                    return Ok(self.rest_client(entry.session.clone()));
                }
                debug!(valid_until = %entry.valid_until, "Cached REST session expired");
                slot.entry = None;
            }

            match &slot.in_flight {
                Some(attempt) => {
                    debug!("Joining login already in flight");
                    Arc::clone(attempt)
                }
                None => {
                    let attempt: Attempt = Arc::new(OnceCell::new());
                    slot.in_flight = Some(Arc::clone(&attempt));
                    attempt
                }
            }
        };

        let session = attempt
            .get_or_init(|| self.acquire(&attempt))
            .await
            .clone()?;
        Ok(self.rest_client(session))
    }

    /// Forget the cached session; the next call logs in again
    pub fn invalidate(&self) {
        self.lock_slot().entry = None;
    }

    pub fn cached_session(&self) -> Option<Session> {
        self.lock_slot()
            .entry
            .as_ref()
            .map(|entry| entry.session.clone())
    }

    async fn acquire(&self, attempt: &Attempt) -> Result<Session> {
        let result = self
            .inner
            .acquirer
            .acquire(&self.inner.credentials, self.inner.options.session_ttl_minutes)
            .await;

        let mut slot = self.lock_slot();
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, attempt))
        {
            slot.in_flight = None;
        }

        match &result {
            Ok(session) => {
                let entry = CacheEntry::new(session.clone(), Utc::now(), self.inner.options.cache_ttl);
                debug!(valid_until = %entry.valid_until, "Caching REST session");
                slot.entry = Some(entry);
            }
            Err(e) => warn!("Login failed, next call will retry: {}", e),
        }

        result
    }

    fn rest_client(&self, session: Session) -> RestClient {
        RestClient::new(self.inner.acquirer.http().clone(), session)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        // Critical sections never panic midway, so a poisoned slot is still consistent
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
