use super::EphemeralStore;
use crate::clock::Clock;
use async_trait::async_trait;
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// Unix seconds at which the entry stops being readable.
    expires_at: i64,
}

/// In-process store for single-instance deployments and tests.
///
/// Expiry is evaluated against the injected clock on every read; the sweeper
/// only reclaims memory.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Swept expired handoff records");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error> {
        let ttl = i64::try_from(ttl_seconds.max(1)).unwrap_or(i64::MAX);
        let expires_at = self.clock.now().saturating_add(ttl);
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let now = self.clock.now();
        let live = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                // Re-check under the shard lock: a concurrent put may have refreshed it
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(1_000);
        (MemoryStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn expired_reads_look_missing() {
        let (store, clock) = store();
        store.put("k", "v", 10).await.unwrap();

        clock.advance(9);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(1);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert!(store.is_empty(), "expired entry is dropped on read");
    }

    #[tokio::test]
    async fn put_replaces_value_and_ttl() {
        let (store, clock) = store();
        store.put("k", "old", 5).await.unwrap();
        clock.advance(4);
        store.put("k", "new", 5).await.unwrap();
        clock.advance(4);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (store, _) = store();
        store.put("k", "v", 5).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_is_clamped() {
        let (store, clock) = store();
        store.put("k", "v", 0).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        clock.advance(1);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_only_removes_expired() {
        let (store, clock) = store();
        store.put("short", "v", 1).await.unwrap();
        store.put("long", "v", 100).await.unwrap();
        clock.advance(2);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_corrupt() {
        let (store, _) = store();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put("shared", &format!("value-{}", i), 60).await.unwrap();
                store.get("shared").await.unwrap()
            }));
        }
        for handle in handles {
            let seen = handle.await.unwrap().unwrap();
            assert!(seen.starts_with("value-"));
        }
    }
}
