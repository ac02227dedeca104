//! In-process store with per-entry expiry.
//!
//! Useful when a single process owns the cache, and as a deterministic stand-in for redis in
//! tests: expiry is measured with [`tokio::time::Instant`], so a paused tokio clock controls it.

use super::{expiry_millis, parse_counter, KvStore};
use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum time between two full sweeps of expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Entries {
    map: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Entries {
    /// Drop expired entries, at most once per [`SWEEP_INTERVAL`]. Called on every write, so
    /// expired content is released as long as the store keeps being written to.
    fn sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.map.retain(|_, e| !e.is_expired(now));
        self.last_sweep = now;
    }
}

/// Thread-safe, cloneable handle to a shared in-memory key-value map.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<Entries>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            })),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry right away.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.map.retain(|_, e| !e.is_expired(now));
        entries.last_sweep = now;
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.read().map.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.map.get(key) {
                None => return Ok(None),
                Some(e) if !e.is_expired(now) => return Ok(Some(e.value.clone())),
                Some(_) => {}
            }
        }

        // expired: release it, unless it was rewritten in the meantime
        let mut entries = self.entries.write();
        if entries.map.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.map.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let millis = expiry_millis(key, ttl)?;
        let now = Instant::now();
        let entry = Entry {
            value: value.to_vec(),
            expires_at: Some(now + Duration::from_millis(millis)),
        };

        let mut entries = self.entries.write();
        entries.sweep(now);
        entries.map.insert(key.to_string(), entry);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.sweep(now);

        let (current, expires_at) = match entries.map.get(key) {
            Some(e) if !e.is_expired(now) => (parse_counter(key, &e.value)?, e.expires_at),
            _ => (0, None),
        };
        let next = current.checked_add(1).ok_or_else(|| StoreError::Overflow {
            key: key.to_string(),
        })?;

        // keeps an existing expiry, like INCR does
        entries.map.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nothing").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_expires() {
        let store = MemoryStore::new();
        store
            .set_ex("k", b"v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_overwrites_and_resets_ttl() {
        let store = MemoryStore::new();
        store
            .set_ex("k", b"old", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        store
            .set_ex("k", b"new", Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"new"[..]));
    }

    #[tokio::test]
    async fn test_incr_counts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some(&b"2"[..]));
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let store = MemoryStore::new();
        store
            .set_ex("c", b"hello", Duration::from_secs(10))
            .await
            .unwrap();
        let err = store.incr("c").await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnInteger { key } if key == "c"));
    }

    #[tokio::test]
    async fn test_incr_is_atomic_across_tasks() {
        let store = MemoryStore::new();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.spawn(async move { store.incr("c").await.unwrap() });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some(&b"50"[..]));
    }

    fn stored(store: &MemoryStore) -> usize {
        store.entries.read().map.len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_released_by_writes() {
        let store = MemoryStore::new();
        for i in 0..1000 {
            store
                .set_ex(&format!("cached:{i}"), b"page", Duration::from_secs(10))
                .await
                .unwrap();
        }
        assert_eq!(stored(&store), 1000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        store.incr("count:other").await.unwrap();
        assert_eq!(stored(&store), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_releases_expired_entry() {
        let store = MemoryStore::new();
        store
            .set_ex("k", b"v", Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(stored(&store), 0);
    }

    #[tokio::test]
    async fn test_set_ex_rejects_zero_expiry() {
        let store = MemoryStore::new();
        let err = store.set_ex("k", b"v", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidExpiry { key, .. } if key == "k"));
        assert_eq!(stored(&store), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_has_millisecond_precision() {
        let store = MemoryStore::new();
        store
            .set_ex("k", b"v", Duration::from_micros(1_999_900))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(1998)).await;
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_reports_overflow() {
        let store = MemoryStore::new();
        let max = u64::MAX.to_string();
        store
            .set_ex("c", max.as_bytes(), Duration::from_secs(10))
            .await
            .unwrap();

        let err = store.incr("c").await.unwrap_err();
        assert!(matches!(err, StoreError::Overflow { key } if key == "c"));
        assert_eq!(store.get("c").await.unwrap(), Some(max.into_bytes()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let store = MemoryStore::new();
        store
            .set_ex("short", b"1", Duration::from_millis(1))
            .await
            .unwrap();
        store.incr("forever").await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        store.cleanup_expired();
        assert_eq!(store.len(), 1);
        assert!(store.get("forever").await.unwrap().is_some());
    }
}
