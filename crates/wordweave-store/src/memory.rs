//! In-memory [`SnapshotStore`] with per-entry TTL.
//!
//! Expiry is lazy: a read past the deadline behaves as "not found" and
//! drops the entry. [`MemoryStore::sweep`] exists for callers that want
//! to reclaim memory proactively (the server runs it on a slow loop).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use wordweave_protocol::{ConnectionId, PlayerId, Session, SessionId};

use crate::SnapshotStore;

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Entry<Session>>,
    codes: HashMap<String, Entry<SessionId>>,
    connections: HashMap<ConnectionId, Entry<SessionId>>,
    scratch: HashMap<(SessionId, usize), Entry<HashMap<PlayerId, String>>>,
}

/// In-process store. Cheap to clone behind an `Arc` at the server level;
/// all keyspaces share one lock because every operation is a handful of
/// map touches.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Drops every expired entry across all keyspaces.
    pub async fn sweep(&self) {
        let mut inner = self.inner.lock().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, e| !e.expired());
        inner.codes.retain(|_, e| !e.expired());
        inner.connections.retain(|_, e| !e.expired());
        inner.scratch.retain(|_, e| !e.expired());
        let dropped = before - inner.sessions.len();
        if dropped > 0 {
            tracing::debug!(dropped, "swept expired sessions");
        }
    }

    /// Number of live (unexpired) sessions. Test/diagnostics helper.
    pub async fn session_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.sessions.values().filter(|e| !e.expired()).count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemoryStore {
    async fn get(&self, id: SessionId) -> Option<Session> {
        let mut inner = self.inner.lock().await;
        match inner.sessions.get(&id) {
            Some(e) if !e.expired() => Some(e.value.clone()),
            Some(_) => {
                inner.sessions.remove(&id);
                None
            }
            None => None,
        }
    }

    async fn put(&self, session: &Session, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        inner
            .sessions
            .insert(session.id, Entry::new(session.clone(), ttl));
    }

    async fn delete(&self, id: SessionId) {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(&id);
    }

    async fn session_by_code(&self, code: &str) -> Option<SessionId> {
        let mut inner = self.inner.lock().await;
        match inner.codes.get(code) {
            Some(e) if !e.expired() => Some(e.value),
            Some(_) => {
                inner.codes.remove(code);
                None
            }
            None => None,
        }
    }

    async fn code_available(&self, code: &str) -> bool {
        self.session_by_code(code).await.is_none()
    }

    async fn bind_code(&self, code: &str, id: SessionId, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        inner.codes.insert(code.to_string(), Entry::new(id, ttl));
    }

    async fn bind_code_if_free(
        &self,
        code: &str,
        id: SessionId,
        ttl: Duration,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.codes.get(code).is_some_and(|e| !e.expired()) {
            return false;
        }
        inner.codes.insert(code.to_string(), Entry::new(id, ttl));
        true
    }

    async fn release_code(&self, code: &str) {
        let mut inner = self.inner.lock().await;
        inner.codes.remove(code);
    }

    async fn session_by_connection(
        &self,
        connection: ConnectionId,
    ) -> Option<SessionId> {
        let mut inner = self.inner.lock().await;
        match inner.connections.get(&connection) {
            Some(e) if !e.expired() => Some(e.value),
            Some(_) => {
                inner.connections.remove(&connection);
                None
            }
            None => None,
        }
    }

    async fn bind_connection(
        &self,
        connection: ConnectionId,
        id: SessionId,
        ttl: Duration,
    ) {
        let mut inner = self.inner.lock().await;
        inner.connections.insert(connection, Entry::new(id, ttl));
    }

    async fn unbind_connection(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock().await;
        inner.connections.remove(&connection);
    }

    async fn put_scratch(
        &self,
        id: SessionId,
        phase: usize,
        player: PlayerId,
        word: &str,
        ttl: Duration,
    ) {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .scratch
            .entry((id, phase))
            .or_insert_with(|| Entry::new(HashMap::new(), ttl));
        // Refresh the deadline on every write so a slow phase can't lose
        // its early words.
        entry.expires_at = Instant::now() + ttl;
        entry.value.insert(player, word.to_string());
    }

    async fn scratch_words(
        &self,
        id: SessionId,
        phase: usize,
    ) -> HashMap<PlayerId, String> {
        let mut inner = self.inner.lock().await;
        match inner.scratch.get(&(id, phase)) {
            Some(e) if !e.expired() => e.value.clone(),
            Some(_) => {
                inner.scratch.remove(&(id, phase));
                HashMap::new()
            }
            None => HashMap::new(),
        }
    }

    async fn clear_scratch(&self, id: SessionId, phase: usize) {
        let mut inner = self.inner.lock().await;
        inner.scratch.remove(&(id, phase));
    }
}
