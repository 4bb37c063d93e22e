//! The session registry: session id → user record.
//!
//! Explicitly constructed and passed around by `Arc`; there is no global
//! instance. Reads take a shared lock and may run concurrently; creates,
//! deletes, and lazy TTL evictions take the exclusive lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use gauntlet_protocol::{SessionId, UserId};
use tokio::time::Instant;

use crate::token::generate_secret;
use crate::{User, UserHandle};

/// Configuration for the registry.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// How long a session stays resumable after creation. `None` keeps
    /// sessions until the process exits.
    pub ttl: Option<Duration>,
}

struct Entry {
    user: UserHandle,
    created_at: Instant,
}

/// Maps session ids to user records.
///
/// ```text
/// create() ──→ get() ... get() ──→ delete()
///                 │
///                 └─ older than ttl? evict, report None
/// ```
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    config: SessionConfig,
    next_user_id: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            next_user_id: AtomicU64::new(1),
        }
    }

    /// Allocates a new user in [`Stage::Waiting`](gauntlet_protocol::Stage)
    /// under a fresh session id.
    pub fn create(&self) -> (UserHandle, SessionId) {
        let user_id = UserId(self.next_user_id.fetch_add(1, Ordering::Relaxed));
        let session_id = SessionId::new(generate_secret());
        let user = UserHandle::new(User::new(user_id, session_id.clone()));

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(
            session_id.clone(),
            Entry {
                user: user.clone(),
                created_at: Instant::now(),
            },
        );
        drop(sessions);

        tracing::info!(%user_id, %session_id, "session created");
        (user, session_id)
    }

    /// Looks up a session.
    ///
    /// Returns `None` for unknown ids and for sessions older than the TTL;
    /// the latter are evicted on the way out.
    pub fn get(&self, session_id: &SessionId) -> Option<UserHandle> {
        let created_at = {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            let entry = sessions.get(session_id)?;
            if !self.is_expired(entry.created_at) {
                return Some(entry.user.clone());
            }
            entry.created_at
        };

        // Upgrade to the write lock. Only evict the entry we saw expire:
        // a concurrent delete may already have removed it.
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(session_id)
            .is_some_and(|e| e.created_at == created_at)
        {
            sessions.remove(session_id);
            tracing::info!(%session_id, "session expired");
        }
        None
    }

    /// Removes a session. Unknown ids are ignored.
    pub fn delete(&self, session_id: &SessionId) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if removed.is_some() {
            tracing::debug!(%session_id, "session deleted");
        }
    }

    /// Number of stored sessions, including ones that have expired but
    /// have not been looked up since.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, created_at: Instant) -> bool {
        self.config
            .ttl
            .is_some_and(|ttl| created_at.elapsed() > ttl)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
