//! Snapshot storage for Wordweave sessions.
//!
//! The engine never holds session state in memory between operations —
//! every mutation re-reads the snapshot through this interface and
//! writes the whole session back. The store is therefore the single
//! shared mutable resource, and everything in it carries a bounded TTL:
//! a missing entry is always "not found", never an error.
//!
//! [`MemoryStore`] is the in-process implementation used by the server
//! and the tests; the trait seam exists so a networked key-value store
//! can replace it without touching the engine.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;
use std::time::Duration;

use wordweave_protocol::{ConnectionId, PlayerId, Session, SessionId};

/// Key-value persistence with per-entry expiry.
///
/// Three keyspaces plus a scratch area:
/// - session id → full session snapshot
/// - join code → session id
/// - connection id → session id
/// - (session, phase) → raw words keyed by player, kept separate from
///   the committed sentences so players can't see each other's answers
///   mid-phase
///
/// Methods are declared as `impl Future + Send` (rather than `async
/// fn`) because the engine's timer and bot tasks call them from inside
/// `tokio::spawn`. Implementations can still be written with `async fn`.
pub trait SnapshotStore: Send + Sync + 'static {
    /// Fetches the current snapshot, if the session still exists.
    fn get(&self, id: SessionId) -> impl Future<Output = Option<Session>> + Send;

    /// Replaces the whole snapshot. Field-level patching is deliberately
    /// not offered — partial updates are how snapshots get corrupted.
    fn put(&self, session: &Session, ttl: Duration) -> impl Future<Output = ()> + Send;

    /// Removes the snapshot. Missing is fine.
    fn delete(&self, id: SessionId) -> impl Future<Output = ()> + Send;

    /// Resolves a join code to a session id.
    fn session_by_code(&self, code: &str) -> impl Future<Output = Option<SessionId>> + Send;

    /// True if no live session holds this code.
    fn code_available(&self, code: &str) -> impl Future<Output = bool> + Send;

    fn bind_code(
        &self,
        code: &str,
        id: SessionId,
        ttl: Duration,
    ) -> impl Future<Output = ()> + Send;

    /// Binds the code only if no live session holds it; returns whether
    /// the bind happened. Check and write are one atomic step, so two
    /// concurrent creates can never both claim a code.
    fn bind_code_if_free(
        &self,
        code: &str,
        id: SessionId,
        ttl: Duration,
    ) -> impl Future<Output = bool> + Send;

    fn release_code(&self, code: &str) -> impl Future<Output = ()> + Send;

    /// Resolves a transport connection to the session it belongs to.
    fn session_by_connection(
        &self,
        connection: ConnectionId,
    ) -> impl Future<Output = Option<SessionId>> + Send;

    fn bind_connection(
        &self,
        connection: ConnectionId,
        id: SessionId,
        ttl: Duration,
    ) -> impl Future<Output = ()> + Send;

    fn unbind_connection(
        &self,
        connection: ConnectionId,
    ) -> impl Future<Output = ()> + Send;

    /// Records one player's raw word for one phase.
    fn put_scratch(
        &self,
        id: SessionId,
        phase: usize,
        player: PlayerId,
        word: &str,
        ttl: Duration,
    ) -> impl Future<Output = ()> + Send;

    /// All raw words recorded for one phase.
    fn scratch_words(
        &self,
        id: SessionId,
        phase: usize,
    ) -> impl Future<Output = HashMap<PlayerId, String>> + Send;

    fn clear_scratch(
        &self,
        id: SessionId,
        phase: usize,
    ) -> impl Future<Output = ()> + Send;
}
