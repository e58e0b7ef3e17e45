//! In-process cache with no durability.
//!
//! The snapshot channels double as storage: the latest value sent on a key's
//! channel is the entry. Useful for tests and for stores whose data does not
//! need to survive a restart.

use async_trait::async_trait;
use larder_core::{CachedData, Cacheable, StoreKey, StoreResult};
use tracing::trace;

use crate::channels::{into_read_stream, KeyedChannels};
use crate::traits::{Cache, CacheReadStream, CacheStats, StatsRecorder};

/// Cache backed entirely by per-key watch channels.
#[derive(Debug)]
pub struct InMemoryCache<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    channels: KeyedChannels<K, T>,
    stats: StatsRecorder,
}

impl<K, T> Default for InMemoryCache<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    fn default() -> Self {
        Self {
            channels: KeyedChannels::new(),
            stats: StatsRecorder::default(),
        }
    }
}

impl<K, T> InMemoryCache<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-populated with `entries`.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CachedData<K, T>>,
    {
        let cache = Self::new();
        for entry in entries {
            cache.channels.publish(&entry.key().clone(), Some(entry));
        }
        cache
    }

    /// Current snapshot for `key` without subscribing.
    pub fn peek(&self, key: &K) -> Option<CachedData<K, T>> {
        self.channels.current(key)
    }
}

#[async_trait]
impl<K, T> Cache<K, T> for InMemoryCache<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    fn read(&self, key: &K) -> CacheReadStream<K, T> {
        let receiver = self.channels.subscribe_or_load(key, || None);
        self.stats.record_read(receiver.borrow().is_some());
        into_read_stream(receiver)
    }

    async fn write(&self, data: CachedData<K, T>) -> StoreResult<()> {
        trace!(key = ?data.key(), last_fetched = data.last_fetched(), "memory cache write");
        let key = data.key().clone();
        self.channels.publish(&key, Some(data));
        self.stats.record_write();
        Ok(())
    }

    async fn mark_as_stale(&self, key: &K) -> StoreResult<()> {
        if self.channels.mark_stale(key) {
            self.stats.record_stale_marks(1);
        }
        Ok(())
    }

    async fn mark_all_as_stale(&self) -> StoreResult<u64> {
        let marked = self.channels.mark_all_stale();
        self.stats.record_stale_marks(marked);
        Ok(marked)
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.channels.populated())
    }
}
