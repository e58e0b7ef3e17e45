//! Larder Storage - Cache Traits and Persisters
//!
//! Defines the persister abstraction consumed by the store orchestrator and
//! ships two implementations.
//!
//! # Design Philosophy
//!
//! The cache is the single source of truth. Reads are live: a reader gets the
//! current snapshot immediately and then every write or stale-mark for that
//! key, for as long as it stays subscribed. Every reader of a key shares the
//! same hot channel, so all of them observe the same updates.
//!
//! Staleness is a property of the entry (its `last_fetched` stamp), never a
//! deletion: marking stale keeps the value visible until it is overwritten.
//!
//! # Example
//!
//! ```ignore
//! let env = LmdbEnvironment::open(&PersistenceConfig::from_env()?)?;
//! let cache: LmdbCache<AccountKey, Balance> = LmdbCache::new(env, "balances");
//!
//! let mut updates = cache.read(&key);
//! cache.write(CachedData::new(key.clone(), balance, now)).await?;
//! cache.mark_as_stale(&key).await?;
//! ```

pub mod channels;
pub mod lmdb_backend;
pub mod memory;
pub mod namespaced_key;
pub mod traits;

pub use channels::KeyedChannels;
pub use lmdb_backend::{LmdbCache, LmdbCacheError, LmdbEnvironment};
pub use memory::InMemoryCache;
pub use namespaced_key::NamespacedKey;
pub use traits::{Cache, CacheReadStream, CacheStats, StatsRecorder};
