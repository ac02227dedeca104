use crate::coalesce::{InFlight, Role};
use crate::counter::AccessCounter;
use crate::error::{fetch_cause, CacheError, FetchCause};
use crate::fetch::Fetch;
use crate::key::ResourceKey;
use crate::store::KvStore;
use std::num::NonZeroU64;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_TTL_SECS: NonZeroU64 = match NonZeroU64::new(10) {
    Some(secs) => secs,
    None => unreachable!(),
};

/// Tunables for [`FetchCache`].
#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct CacheSettings {
    /// How long fetched content stays fresh, in whole seconds.
    #[builder(default = DEFAULT_TTL_SECS)]
    pub ttl_secs: NonZeroU64,
    /// Collapse concurrent misses on the same key into one fetch.
    #[builder(default = true)]
    pub coalesce: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.get())
    }
}

/// Where the content of a successful lookup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Served from a live cache entry.
    Hit,
    /// Fetched from the origin by this call, which also wrote the cache entry.
    Miss,
    /// Fetched from the origin by a concurrent call for the same key.
    Coalesced,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Coalesced => "coalesced",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: Vec<u8>,
    pub source: CacheSource,
    /// Access count for the key after this call was recorded.
    pub access_count: u64,
}

/// Read-through cache in front of a [`Fetch`] origin that counts every request per key.
///
/// All state lives in the store: content under `cached:<key>` with a TTL, counters under
/// `count:<key>` without one. The only in-process state is the set of fetches currently in
/// flight when coalescing is enabled.
pub struct FetchCache<S, F> {
    counter: AccessCounter<S>,
    store: S,
    fetcher: F,
    ttl: Duration,
    in_flight: Option<InFlight>,
}

impl<S, F> FetchCache<S, F>
where
    S: KvStore + Clone,
    F: Fetch,
{
    pub fn new(store: S, fetcher: F, settings: CacheSettings) -> Self {
        Self {
            counter: AccessCounter::new(store.clone()),
            store,
            fetcher,
            ttl: settings.ttl(),
            in_flight: settings.coalesce.then(InFlight::new),
        }
    }

    pub fn counter(&self) -> &AccessCounter<S> {
        &self.counter
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return fresh-or-cached content for `key`.
    ///
    /// The access is counted before anything else and stays counted whatever happens next.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        Ok(self.get_detailed(key).await?.content)
    }

    /// Like [`FetchCache::get`], also reporting where the content came from.
    pub async fn get_detailed(&self, key: &str) -> Result<Fetched, CacheError> {
        let key = ResourceKey::new(key);

        let access_count = self.counter.increment(key).await.map_err(|e| {
            error!("fail to count access to `{key}`: {e}");
            e
        })?;

        let cached = self.store.get(&key.content_key()).await.map_err(|e| {
            error!("fail to look up cache for `{key}`: {e}");
            e
        })?;
        if let Some(content) = cached {
            debug!("cache hit for `{key}` (access #{access_count})");
            return Ok(Fetched {
                content,
                source: CacheSource::Hit,
                access_count,
            });
        }

        debug!("cache miss for `{key}` (access #{access_count})");
        let (content, source) = self.populate(key).await?;
        Ok(Fetched {
            content,
            source,
            access_count,
        })
    }

    /// How many times `key` has been requested through this cache or any other sharing the store.
    pub async fn read(&self, key: &str) -> Result<u64, CacheError> {
        Ok(self.counter.read(ResourceKey::new(key)).await?)
    }

    async fn populate(&self, key: ResourceKey<'_>) -> Result<(Vec<u8>, CacheSource), CacheError> {
        let Some(in_flight) = &self.in_flight else {
            let content = self
                .fetcher
                .fetch(key.as_str())
                .await
                .map_err(|e| fetch_failed(key, fetch_cause(e)))?;
            self.write_entry(key, &content).await?;
            return Ok((content, CacheSource::Miss));
        };

        let (outcome, role) = in_flight
            .run(key.as_str(), move || async move {
                self.fetcher.fetch(key.as_str()).await.map_err(fetch_cause)
            })
            .await;
        let content = outcome.map_err(|cause| fetch_failed(key, cause))?;

        match role {
            Role::Leader => {
                self.write_entry(key, &content).await?;
                Ok((content, CacheSource::Miss))
            }
            Role::Follower => {
                debug!("reused in-flight fetch for `{key}`");
                Ok((content, CacheSource::Coalesced))
            }
        }
    }

    async fn write_entry(&self, key: ResourceKey<'_>, content: &[u8]) -> Result<(), CacheError> {
        self.store
            .set_ex(&key.content_key(), content, self.ttl)
            .await
            .map_err(|e| {
                error!("fail to cache content for `{key}`: {e}");
                CacheError::from(e)
            })
    }
}

fn fetch_failed(key: ResourceKey<'_>, source: FetchCause) -> CacheError {
    warn!("fail to fetch `{key}`: {source}");
    CacheError::FetchFailed {
        key: key.to_string(),
        source,
    }
}

impl<S: std::fmt::Debug, F> std::fmt::Debug for FetchCache<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("store", &self.store)
            .field("ttl", &self.ttl)
            .field("coalesce", &self.in_flight.is_some())
            .finish_non_exhaustive()
    }
}
