use crate::error::StoreError;
use crate::key::ResourceKey;
use crate::store::{parse_counter, KvStore};

/// Per-key demand counter. Counts requests observed, not fetches performed.
#[derive(Debug, Clone)]
pub struct AccessCounter<S> {
    store: S,
}

impl<S: KvStore> AccessCounter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record one access to `key` with a single atomic store increment and return the new count.
    ///
    /// Failures are returned as-is; a lost count is never retried here.
    pub async fn increment(&self, key: ResourceKey<'_>) -> Result<u64, StoreError> {
        self.store.incr(&key.count_key()).await
    }

    /// Current count for `key`, 0 if it was never accessed.
    pub async fn read(&self, key: ResourceKey<'_>) -> Result<u64, StoreError> {
        let count_key = key.count_key();
        match self.store.get(&count_key).await? {
            Some(raw) => parse_counter(&count_key, &raw),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_unknown_is_zero() {
        let counter = AccessCounter::new(MemoryStore::new());
        assert_eq!(counter.read("never".into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_increment_then_read() {
        let counter = AccessCounter::new(MemoryStore::new());
        assert_eq!(counter.increment("r".into()).await.unwrap(), 1);
        assert_eq!(counter.increment("r".into()).await.unwrap(), 2);
        assert_eq!(counter.read("r".into()).await.unwrap(), 2);
        assert_eq!(counter.read("other".into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_has_no_side_effect() {
        let store = MemoryStore::new();
        let counter = AccessCounter::new(store.clone());
        counter.read("r".into()).await.unwrap();
        counter.read("r".into()).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_does_not_expire() {
        let counter = AccessCounter::new(MemoryStore::new());
        counter.increment("r".into()).await.unwrap();
        tokio::time::advance(Duration::from_secs(60 * 60 * 24)).await;
        assert_eq!(counter.read("r".into()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_reports_garbage_counter() {
        let store = MemoryStore::new();
        store
            .set_ex("count:r", b"not a number", Duration::from_secs(10))
            .await
            .unwrap();
        let counter = AccessCounter::new(store);
        let err = counter.read("r".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnInteger { key } if key == "count:r"));
    }
}
