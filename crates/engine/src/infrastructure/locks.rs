//! Per-session serialization.
//!
//! Every mutation of a session's aggregate family (the session itself, its
//! current event, party health, its loot records) happens under that
//! session's lock, so "first submission wins" and "resolution fires once"
//! hold under parallel callers. Different sessions proceed fully in
//! parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use delve_domain::SessionId;

#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one session, creating it on first use.
    pub async fn acquire(&self, session_id: SessionId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop a session's lock entry once the session is deleted.
    pub fn release(&self, session_id: SessionId) {
        self.locks.remove(&session_id);
    }
}
