//! Bearer-token capability injected into the executor and the recorder.
//!
//! A [`Session`] moves through `init(token) → active → invalidate()`. The
//! recorder invalidates it when the history service answers `401`, after
//! which requests go out unauthenticated and recording becomes a no-op
//! until the host application initialises a fresh token.

use std::sync::RwLock;
use tracing::{info, warn};

/// Source of the current bearer token.
pub trait SessionProvider: Send + Sync {
    /// The active token, if any.
    fn token(&self) -> Option<String>;

    /// Drop the token; later calls to [`SessionProvider::token`] return `None`.
    fn invalidate(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Active(String),
    Invalidated,
}

/// In-memory session with an explicit lifecycle.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
    anonymous: bool,
}

impl Session {
    /// A session without a token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that will never hold a token; [`Session::init`] is ignored.
    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Self::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// A session already holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.init(token);
        session
    }

    /// Read the token from an environment variable. Blank values are ignored.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Self::with_token(token.trim()),
            _ => Self::new(),
        }
    }

    /// Store `token` and become active.
    pub fn init(&self, token: impl Into<String>) {
        if self.anonymous {
            warn!("Ignoring token for an anonymous session");
            return;
        }
        let token = token.into();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = if token.trim().is_empty() {
            SessionState::Uninitialized
        } else {
            SessionState::Active(token)
        };
    }

    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SessionProvider for Session {
    fn token(&self) -> Option<String> {
        match &*self.state.read().unwrap_or_else(|e| e.into_inner()) {
            SessionState::Active(token) => Some(token.clone()),
            _ => None,
        }
    }

    fn invalidate(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if matches!(*state, SessionState::Active(_)) {
            info!("Session invalidated");
        }
        *state = SessionState::Invalidated;
    }
}
