//! Per-session serialization.
//!
//! Every mutation of a session runs under that session's lock, and
//! re-reads the snapshot after acquiring it. Different sessions never
//! contend. Entries are created on first use and dropped once the last
//! waiter releases, so the map stays proportional to the number of
//! sessions with in-flight operations, not the number of sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use wordweave_protocol::SessionId;

#[derive(Default)]
struct LockEntry {
    lock: Mutex<()>,
    waiters: AtomicUsize,
}

/// A keyed async mutex over session ids.
#[derive(Default)]
pub struct SessionLocks {
    entries: Mutex<HashMap<SessionId, Arc<LockEntry>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op` while holding the exclusive lock for `id`.
    ///
    /// `op` must re-read whatever state it needs *after* this call
    /// acquires the lock; anything observed beforehand may be stale.
    pub async fn run_exclusive<F, Fut, T>(&self, id: SessionId, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let entry = {
            let mut entries = self.entries.lock().await;
            let entry = entries.entry(id).or_default();
            // Counted inside the map lock, so a concurrent release can't
            // observe zero waiters while we hold a clone.
            entry.waiters.fetch_add(1, Ordering::SeqCst);
            Arc::clone(entry)
        };

        let result = {
            let _guard = entry.lock.lock().await;
            op().await
        };

        let mut entries = self.entries.lock().await;
        if entry.waiters.fetch_sub(1, Ordering::SeqCst) == 1 {
            entries.remove(&id);
        }
        result
    }

    /// Number of sessions with in-flight operations. Test helper.
    #[cfg(test)]
    async fn active(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_exclusive_serializes_same_session() {
        let locks = Arc::new(SessionLocks::new());
        // Non-atomic increment under the lock: lost updates if the lock
        // ever admits two tasks at once.
        let counter = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                locks
                    .run_exclusive(SessionId(1), || async {
                        let seen = counter.load(Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        counter.store(seen + 1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_sessions_do_not_contend() {
        let locks = Arc::new(SessionLocks::new());

        // Hold session 1's lock, then take session 2's; a global lock
        // would deadlock here.
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let holder = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks
                    .run_exclusive(SessionId(1), || async {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                    })
                    .await;
            })
        };
        started_rx.await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(1),
            locks.run_exclusive(SessionId(2), || async {}),
        )
        .await
        .expect("session 2 must not wait on session 1");

        let _ = release_tx.send(());
        holder.await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_cleaned_up_after_release() {
        let locks = SessionLocks::new();
        locks.run_exclusive(SessionId(1), || async {}).await;
        locks.run_exclusive(SessionId(2), || async {}).await;
        assert_eq!(locks.active().await, 0);
    }
}
