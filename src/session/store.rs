use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Session;
use crate::error::{MetadataError, Result};

/// In-memory sessions bounded by a TTL and a capacity.
///
/// Sessions expire `ttl` after creation. An expired session is removed when
/// it is next accessed (reported once as [`MetadataError::SessionExpired`],
/// afterwards as [`MetadataError::SessionNotFound`]) and all expired
/// sessions are purged on every insert. When the store is still full after
/// purging, the oldest session is evicted.
///
/// The lock is only held for the synchronous closure passed to
/// [`SessionStore::with_session`]; callers must not do I/O inside it.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
    ttl: Duration,
    capacity: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Store a new session and return its id.
    pub async fn insert(&self, session: Session) -> Uuid {
        let id = session.id();
        let mut sessions = self.sessions.lock().await;

        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s));
        if sessions.len() < before {
            log::debug!("Purged {} expired session(s)", before - sessions.len());
        }

        while sessions.len() >= self.capacity {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.created_at())
                .map(Session::id)
            else {
                break;
            };
            log::info!("Session store full, evicting {oldest}");
            sessions.remove(&oldest);
        }

        sessions.insert(id, session);
        id
    }

    /// Run `f` against the live session `id`.
    pub async fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(MetadataError::SessionNotFound(id))?;

        if self.is_expired(session) {
            sessions.remove(&id);
            log::info!("Session {id} expired");
            return Err(MetadataError::SessionExpired(id));
        }

        f(session)
    }

    /// Number of stored sessions, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn is_expired(&self, session: &Session) -> bool {
        session.created_at().elapsed() >= self.ttl
    }
}
