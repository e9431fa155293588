use bh_auth::{BhAuthError, Session};
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the event channel before slow subscribers start lagging
const EVENT_CAPACITY: usize = 32;

/// Session lifecycle notifications
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new session was acquired
    Login(Session),
    /// A login or refresh attempt failed; any previous session is still in place
    LoginFailed(BhAuthError),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => "login",
            Self::LoginFailed(_) => "loginFailed",
        }
    }
}

/// Fan-out of session events to any number of subscribers
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let name = event.name();
        // No subscribers is fine
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!(event = name, delivered, "Session event emitted");
    }
}
