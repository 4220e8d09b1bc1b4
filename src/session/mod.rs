//! Sessions and the authentication provider.
//!
//! Every remote read, write and push channel is scoped to a [`Session`].
//! [`InMemoryAuth`] is a local provider used by tests and the HTTP surface;
//! with the `emitter` feature it fans session changes out to listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event name used on the session emitter.
pub const SESSION_CHANGED: &str = "session_changed";

/// Session and authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no active session")]
    NoSession,

    #[error("session expired")]
    Expired,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    /// Expiry as milliseconds since the Unix epoch; `None` never expires.
    pub expires_at_ms: Option<u64>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            expires_at_ms: None,
        }
    }

    pub fn with_expiry(mut self, expires_at_ms: u64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map(|at| at <= now_ms).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    /// Fail with `AuthError::Expired` if the session is no longer valid.
    pub fn ensure_valid(&self) -> Result<(), AuthError> {
        if self.is_expired() {
            Err(AuthError::Expired)
        } else {
            Ok(())
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Session transitions broadcast to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionChange {
    SignedIn { user_id: String },
    SignedOut { user_id: String },
    Expired { user_id: String },
}

/// Source of the current session.
pub trait AuthProvider: Send + Sync {
    /// The current, unexpired session.
    fn current_session(&self) -> Result<Session, AuthError>;

    /// End the current session.
    fn sign_out(&self);
}

#[derive(Default)]
struct AuthState {
    current: Option<Session>,
    issued: HashMap<String, Session>,
    next_token: u64,
}

/// In-process authentication provider.
///
/// Clone-friendly via `Arc`; clones share the same state.
#[derive(Clone)]
pub struct InMemoryAuth {
    state: Arc<Mutex<AuthState>>,
    #[cfg(feature = "emitter")]
    emitter: Arc<Mutex<EventEmitter>>,
}

impl Default for InMemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuth {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AuthState::default())),
            #[cfg(feature = "emitter")]
            emitter: Arc::new(Mutex::new(EventEmitter::new())),
        }
    }

    /// Issue a new session for `user_id` and make it current.
    pub fn sign_in(&self, user_id: impl Into<String>) -> Session {
        let user_id = user_id.into();
        let session = {
            let mut state = self.lock();
            state.next_token += 1;
            let session = Session::new(
                user_id.clone(),
                format!("token-{}-{}", user_id, state.next_token),
            );
            state
                .issued
                .insert(session.access_token.clone(), session.clone());
            state.current = Some(session.clone());
            session
        };
        debug!(user_id = %session.user_id, "signed in");
        self.broadcast(SessionChange::SignedIn { user_id });
        session
    }

    /// Expire the current session immediately.
    pub fn expire(&self) {
        let expired = {
            let mut state = self.lock();
            let Some(current) = state.current.as_mut() else {
                return;
            };
            current.expires_at_ms = Some(now_ms().saturating_sub(1));
            let expired = current.clone();
            state
                .issued
                .insert(expired.access_token.clone(), expired.clone());
            expired
        };
        debug!(user_id = %expired.user_id, "session expired");
        self.broadcast(SessionChange::Expired {
            user_id: expired.user_id,
        });
    }

    /// Resolve a bearer token issued by this provider.
    pub fn session_for_token(&self, token: &str) -> Result<Session, AuthError> {
        let session = self
            .lock()
            .issued
            .get(token)
            .cloned()
            .ok_or(AuthError::NoSession)?;
        session.ensure_valid()?;
        Ok(session)
    }

    /// Register a listener for session changes. Listeners run on emitter
    /// threads, so delivery is asynchronous.
    #[cfg(feature = "emitter")]
    pub fn on_session_change<F>(&self, listener: F) -> String
    where
        F: Fn(SessionChange) + Send + Sync + 'static,
    {
        self.emitter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .on(SESSION_CHANGED, listener)
    }

    /// Remove a listener registered with [`InMemoryAuth::on_session_change`].
    #[cfg(feature = "emitter")]
    pub fn remove_session_listener(&self, listener_id: &str) {
        if let Ok(mut emitter) = self.emitter.lock() {
            emitter.remove_listener(listener_id);
        }
    }

    #[cfg(feature = "emitter")]
    fn broadcast(&self, change: SessionChange) {
        if let Ok(mut emitter) = self.emitter.lock() {
            emitter.emit(SESSION_CHANGED, change);
        }
    }

    #[cfg(not(feature = "emitter"))]
    fn broadcast(&self, _change: SessionChange) {}

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AuthProvider for InMemoryAuth {
    fn current_session(&self) -> Result<Session, AuthError> {
        let session = self.lock().current.clone().ok_or(AuthError::NoSession)?;
        session.ensure_valid()?;
        Ok(session)
    }

    fn sign_out(&self) {
        let removed = {
            let mut state = self.lock();
            let removed = state.current.take();
            if let Some(session) = &removed {
                state.issued.remove(&session.access_token);
            }
            removed
        };
        if let Some(session) = removed {
            debug!(user_id = %session.user_id, "signed out");
            self.broadcast(SessionChange::SignedOut {
                user_id: session.user_id,
            });
        }
    }
}
