// Store adapters
pub mod memory;
pub mod redis;

pub use self::{memory::MemoryStore, redis::Cacher};

use crate::error::StoreError;
use std::time::Duration;

/// The key-value primitives the cache is built on. Implementations must make `incr` atomic and
/// must be safe to share between concurrent requests.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value`, replacing any previous value and restarting its expiry. Expiries have
    /// millisecond precision; anything shorter than 1ms is rejected.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Increase the integer at `key` by one, treating a missing key as 0. Returns the new value.
    /// Fails instead of wrapping around when the counter is at `u64::MAX`.
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        (**self).set_ex(key, value, ttl).await
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        (**self).incr(key).await
    }
}

/// Counters are stored as decimal text, the same representation redis uses.
pub(crate) fn parse_counter(key: &str, raw: &[u8]) -> Result<u64, StoreError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| StoreError::NotAnInteger {
            key: key.to_string(),
        })
}

/// Expiry in whole milliseconds, the unit every adapter stores. Zero is rejected, as redis does.
pub(crate) fn expiry_millis(key: &str, ttl: Duration) -> Result<u64, StoreError> {
    match u64::try_from(ttl.as_millis()) {
        Ok(millis) if millis > 0 => Ok(millis),
        _ => Err(StoreError::InvalidExpiry {
            key: key.to_string(),
            ttl,
        }),
    }
}

#[test]
fn test_parse_counter() {
    assert_eq!(parse_counter("c", b"42").unwrap(), 42);
    assert!(matches!(
        parse_counter("c", b"-1"),
        Err(StoreError::NotAnInteger { .. })
    ));
}

#[test]
fn test_expiry_millis() {
    assert_eq!(expiry_millis("k", Duration::from_millis(1999)).unwrap(), 1999);
    assert_eq!(expiry_millis("k", Duration::from_secs(10)).unwrap(), 10_000);
    assert!(matches!(
        expiry_millis("k", Duration::ZERO),
        Err(StoreError::InvalidExpiry { .. })
    ));
    assert!(expiry_millis("k", Duration::from_micros(999)).is_err());
}
