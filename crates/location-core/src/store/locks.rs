// ============================
// location-core/src/store/locks.rs
// ============================
//! Per-user writer locks for location records.
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serialises writes to one user's location record.
///
/// The controller holds the guard while it creates or deletes the record and
/// the update handler holds it while writing a fix, so at most one of them
/// touches a given record at a time.
#[derive(Clone, Default)]
pub struct WriterLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WriterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `user_id`'s record
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(user_id.to_string()).or_default().value());
        lock.lock_owned().await
    }

    /// Drop lock entries nobody is holding or waiting on
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
