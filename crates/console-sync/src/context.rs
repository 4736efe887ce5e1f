//! Context: explicit per-console state threaded into the query client and
//! synchronizer instead of process-wide globals.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::conf::ConsoleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// The backend answered 401/403; the session layer must re-authenticate.
    Expired { status: u16 },
}

/// Side channel raised alongside (never instead of) an authorization error.
#[derive(Clone)]
pub struct SessionSignal {
    tx: Arc<watch::Sender<SessionState>>,
}

impl SessionSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Active);
        Self { tx: Arc::new(tx) }
    }

    pub fn expire(&self, status: u16) {
        warn!(status, "Backend rejected session");
        self.tx.send_replace(SessionState::Expired { status });
    }

    /// Called by the session layer once it has re-authenticated.
    pub fn reset(&self) {
        self.tx.send_replace(SessionState::Active);
    }

    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.current(), SessionState::Expired { .. })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ConsoleContext {
    config: Arc<ConsoleConfig>,
    session: SessionSignal,
}

impl ConsoleContext {
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            config: Arc::new(config),
            session: SessionSignal::new(),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionSignal {
        &self.session
    }
}
