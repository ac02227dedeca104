//! A TTL-bounded read-through cache with per-key access counting.
//!
//! [`FetchCache`] sits in front of an expensive, idempotent [`Fetch`] origin. Every request is
//! counted under `count:<key>`; fetched content is memoized under `cached:<key>` for a fixed TTL.
//! Both live in a shared [`KvStore`], usually redis through [`Cacher`].

// Core
pub mod cache;
pub mod counter;
pub mod error;
pub mod key;

// Capabilities
pub mod fetch;
pub mod store;

#[cfg(feature = "reqwest")]
pub mod http;

pub mod config;

mod coalesce;

pub use cache::{CacheSettings, CacheSource, FetchCache, Fetched};
pub use counter::AccessCounter;
pub use error::{CacheError, StoreError};
pub use fetch::Fetch;
pub use key::ResourceKey;
pub use store::{Cacher, KvStore, MemoryStore};
