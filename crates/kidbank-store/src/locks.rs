//! Per-child write serialization.
//!
//! Every ledger mutation of a child holds that child's lock for the whole
//! read-check-write-commit sequence, so two writers can never both pass a
//! balance check against the same stale value.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use kidbank_core::ChildId;

/// Lazily created async mutexes keyed by child id.
#[derive(Debug, Default)]
pub struct ChildLocks {
    inner: Mutex<HashMap<ChildId, Arc<AsyncMutex<()>>>>,
}

impl ChildLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `child_id`.
    pub async fn lock(&self, child_id: ChildId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(child_id).or_default())
        };
        mutex.lock_owned().await
    }

    /// Drop the lock entry of a deleted child.
    pub fn forget(&self, child_id: ChildId) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&child_id);
    }

    /// Number of children with a lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no lock has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_child_is_exclusive() {
        let locks = Arc::new(ChildLocks::new());
        let child = ChildId::generate();

        let guard = locks.lock(child).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock(child).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_children_do_not_block() {
        let locks = ChildLocks::new();
        let _a = locks.lock(ChildId::generate()).await;
        let _b = locks.lock(ChildId::generate()).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn forget_removes_entry() {
        let locks = ChildLocks::new();
        let child = ChildId::generate();
        drop(locks.lock(child).await);
        locks.forget(child);
        assert!(locks.is_empty());
    }
}
