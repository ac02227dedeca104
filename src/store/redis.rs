use super::{expiry_millis, KvStore};
use crate::error::StoreError;
use r2d2::{Pool, PooledConnection};
use redis::Commands;
use std::time::Duration;

/// Redis access through an r2d2 connection pool. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct Cacher {
    pool: Pool<redis::Client>,
}

impl Cacher {
    /// Build a pool over `client`. Fails if no connection can be established within the pool's
    /// connection timeout, so a misconfigured endpoint surfaces at startup.
    pub fn new(client: redis::Client, pool_size: u32) -> Result<Self, StoreError> {
        let pool = Pool::builder().max_size(pool_size).build(client)?;
        Ok(Self { pool })
    }

    pub fn connect(addr: &str, pool_size: u32) -> Result<Self, StoreError> {
        let client = redis::Client::open(addr)?;
        Self::new(client, pool_size)
    }

    pub fn get_conn(&self) -> Result<PooledConnection<redis::Client>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Run a blocking redis command on tokio's blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut conn = pool.get()?;
            Ok(op(&mut *conn)?)
        })
        .await?
    }
}

impl std::fmt::Debug for Cacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Cacher")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

#[async_trait::async_trait]
impl KvStore for Cacher {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| conn.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let millis = expiry_millis(key, ttl)?;
        let key = key.to_string();
        let value = value.to_vec();
        self.with_conn(move |conn| {
            redis::cmd("PSETEX")
                .arg(key)
                .arg(millis)
                .arg(value)
                .query(conn)
        })
        .await
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| conn.incr(key, 1)).await
    }
}

#[tokio::test]
#[ignore = "requires a running redis, set REDIS_ADDR"]
async fn test_redis_primitives() {
    dotenvy::dotenv().ok();
    let addr = std::env::var("REDIS_ADDR").unwrap();
    let cacher = Cacher::connect(&addr, 2).unwrap();

    let suffix = std::process::id();
    let content_key = format!("cached:pagecache-test-{suffix}");
    let count_key = format!("count:pagecache-test-{suffix}");

    assert_eq!(cacher.get(&content_key).await.unwrap(), None);
    cacher
        .set_ex(&content_key, b"hello", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(
        cacher.get(&content_key).await.unwrap().as_deref(),
        Some(&b"hello"[..])
    );

    assert_eq!(cacher.incr(&count_key).await.unwrap(), 1);
    assert_eq!(cacher.incr(&count_key).await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(cacher.get(&content_key).await.unwrap(), None);

    let _: () = cacher.get_conn().unwrap().del(&count_key).unwrap();
}
