use std::sync::Arc;
use thiserror::Error;

/// Failure of a key-value store primitive.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fail to get connection from redis pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("blocking store task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("value at `{key}` is not an integer")]
    NotAnInteger { key: String },
    #[error("increment of `{key}` would overflow")]
    Overflow { key: String },
    #[error("invalid expiry {ttl:?} for `{key}`")]
    InvalidExpiry { key: String, ttl: std::time::Duration },
}

/// Fetch failure cause. Shared so that every caller waiting on a coalesced fetch sees it.
pub type FetchCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) fn fetch_cause(err: anyhow::Error) -> FetchCause {
    let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}

/// Error returned by [`crate::FetchCache::get`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store could not be reached or a primitive failed. Nothing was fetched after this.
    #[error("cache store unavailable")]
    StoreUnavailable(#[from] StoreError),
    /// The origin failed. The cache was left untouched for this key.
    #[error("fail to fetch `{key}`")]
    FetchFailed {
        key: String,
        #[source]
        source: FetchCause,
    },
}

impl CacheError {
    /// Whether a caller may reasonably try again. Store outages should fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }
}

#[test]
fn test_retry_policy_distinguishes_kinds() {
    let fetch = CacheError::FetchFailed {
        key: "k".to_string(),
        source: fetch_cause(anyhow::anyhow!("timeout")),
    };
    assert!(fetch.is_retryable());

    let store = CacheError::from(StoreError::NotAnInteger {
        key: "count:k".to_string(),
    });
    assert!(!store.is_retryable());
}

#[test]
fn test_fetch_failure_keeps_cause() {
    use std::error::Error;

    let err = CacheError::FetchFailed {
        key: "k".to_string(),
        source: fetch_cause(anyhow::anyhow!("connection reset")),
    };
    assert_eq!(err.to_string(), "fail to fetch `k`");
    assert_eq!(err.source().unwrap().to_string(), "connection reset");
}
