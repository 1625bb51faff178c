use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use super::UserRecord;

/// Default session lifetime: 24 hours
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Session ID length in bytes (32 bytes = 64 hex chars)
const SESSION_ID_BYTES: usize = 32;

/// Generates a cryptographically random session ID
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..SESSION_ID_BYTES).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

/// Per-client state kept on the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    /// Set once login succeeds
    pub current_user: Option<UserRecord>,
}

impl SessionData {
    pub fn authenticated(user: UserRecord) -> Self {
        Self {
            current_user: Some(user),
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    /// A writer panicked while holding the session map
    Poisoned,
    Backend(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Poisoned => write!(f, "Session store lock poisoned"),
            SessionError::Backend(message) => write!(f, "Session store error: {}", message),
        }
    }
}

impl std::error::Error for SessionError {}

impl<T> From<PoisonError<T>> for SessionError {
    fn from(_: PoisonError<T>) -> Self {
        SessionError::Poisoned
    }
}

/// Server-side session storage keyed by session ID
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session data if the session exists and has not expired
    async fn get(&self, session_id: &str) -> Result<Option<SessionData>, SessionError>;

    /// Stores data under the session ID, starting a fresh lifetime
    async fn set(&self, session_id: &str, data: SessionData) -> Result<(), SessionError>;

    /// Destroys a session. Returns whether it existed.
    async fn destroy(&self, session_id: &str) -> Result<bool, SessionError>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    data: SessionData,
    /// `None` when the lifetime reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl StoredSession {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// In-memory session store
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    session_lifetime: Duration,
}

impl MemorySessionStore {
    /// Creates a new session store
    pub fn new() -> Self {
        Self::with_lifetime(DEFAULT_SESSION_LIFETIME)
    }

    /// Creates a new session store with custom lifetime
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_lifetime: lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.session_lifetime
    }

    /// Cleans up expired sessions
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let initial_count = sessions.len();

        sessions.retain(|session_id, session| {
            if session.is_expired() {
                debug!("Removing expired session: {}", session_id);
                false
            } else {
                true
            }
        });

        initial_count - sessions.len()
    }

    /// Returns the number of active sessions
    pub fn active_session_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .values()
            .filter(|session| !session.is_expired())
            .count()
    }

    /// Returns the total number of sessions (including expired)
    pub fn total_session_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.len()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionData>, SessionError> {
        let sessions = self.sessions.read()?;

        match sessions.get(session_id) {
            Some(session) if session.is_expired() => {
                debug!("Session {} is expired", session_id);
                Ok(None)
            }
            Some(session) => Ok(Some(session.data.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, session_id: &str, data: SessionData) -> Result<(), SessionError> {
        debug!("Storing session {}", session_id);
        let stored = StoredSession {
            data,
            expires_at: Instant::now().checked_add(self.session_lifetime),
        };

        let mut sessions = self.sessions.write()?;
        sessions.insert(session_id.to_string(), stored);
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> Result<bool, SessionError> {
        debug!("Deleting session: {}", session_id);
        let mut sessions = self.sessions.write()?;
        Ok(sessions.remove(session_id).is_some())
    }
}
