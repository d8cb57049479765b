//! Phase countdown bookkeeping.
//!
//! One task per playing session. Starting a timer replaces (and aborts)
//! any previous one, so a session never has two countdowns running.
//! [`PhaseTimers::detach`] exists for the timer task itself: before it
//! forces an advance it removes its own handle *without* aborting, so
//! the advance path can call [`PhaseTimers::cancel`] freely.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use wordweave_protocol::SessionId;

#[derive(Default)]
pub struct PhaseTimers {
    handles: Mutex<HashMap<SessionId, JoinHandle<()>>>,
}

impl PhaseTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the countdown task for a session, aborting any previous one.
    pub async fn start(&self, id: SessionId, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().await;
        if let Some(old) = handles.insert(id, handle) {
            old.abort();
        }
    }

    /// Stops the countdown, if one is running.
    pub async fn cancel(&self, id: SessionId) {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.remove(&id) {
            handle.abort();
        }
    }

    /// Removes the handle without aborting. Called by the timer task on
    /// itself when the deadline fires.
    pub async fn detach(&self, id: SessionId) {
        self.handles.lock().await.remove(&id);
    }

    /// True if a countdown is installed for this session.
    pub async fn is_running(&self, id: SessionId) -> bool {
        self.handles.lock().await.contains_key(&id)
    }
}
