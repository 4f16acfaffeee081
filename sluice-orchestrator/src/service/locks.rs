//! Per-pipeline critical sections
//!
//! The service owns one async mutex per pipeline id. Entries are created on
//! first use and dropped explicitly once a pipeline settles; the store's
//! version check catches any writer that raced an invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct LockCache {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl LockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `pipeline_id`.
    pub async fn acquire(&self, pipeline_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(pipeline_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn invalidate(&self, pipeline_id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.remove(&pipeline_id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_pipeline_is_serialized() {
        let cache = Arc::new(LockCache::new());
        let id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (cache, inside, peak) = (cache.clone(), inside.clone(), peak.clone());
                tokio::spawn(async move {
                    let _guard = cache.acquire(id).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_pipelines_do_not_block_each_other() {
        let cache = LockCache::new();
        let _a = cache.acquire(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_secs(1), cache.acquire(Uuid::new_v4())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_drops_entry() {
        let cache = LockCache::new();
        let id = Uuid::new_v4();
        drop(cache.acquire(id).await);
        assert_eq!(cache.len(), 1);
        cache.invalidate(id);
        assert_eq!(cache.len(), 0);
    }
}
