//! Cache (persister) trait and statistics.
//!
//! This module defines the trait that every cache backend implements and the
//! statistics they report.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use larder_core::{CachedData, Cacheable, StoreKey, StoreResult};

/// Live view of one key: the current snapshot first, then every change.
///
/// `None` means the key has no entry (never written, or unreadable).
pub type CacheReadStream<K, T> = BoxStream<'static, Option<CachedData<K, T>>>;

/// Durable key-value storage with live-read semantics.
///
/// Implementations must be thread-safe and support concurrent access. The
/// stream returned by [`Cache::read`] is hot: every reader of the same key
/// observes the same updates, and it never completes on its own.
///
/// # Corrupt entries
///
/// An entry that cannot be decoded must be surfaced as `None` (a miss) rather
/// than an error, so the store falls back to fetching.
#[async_trait]
pub trait Cache<K, T>: Send + Sync
where
    K: StoreKey,
    T: Cacheable,
{
    /// Subscribe to the snapshot for `key`.
    fn read(&self, key: &K) -> CacheReadStream<K, T>;

    /// Upsert the snapshot for `data.key()`, replacing any previous one, and
    /// notify every reader of that key.
    async fn write(&self, data: CachedData<K, T>) -> StoreResult<()>;

    /// Age the entry for `key` so the next freshness check deems it stale.
    ///
    /// The value stays readable. Missing keys are a no-op.
    async fn mark_as_stale(&self, key: &K) -> StoreResult<()>;

    /// Age every entry of this cache. Returns how many entries were marked.
    async fn mark_all_as_stale(&self) -> StoreResult<u64>;

    /// Get cache statistics.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads whose first snapshot was present.
    pub hits: u64,
    /// Reads whose first snapshot was absent or unreadable.
    pub misses: u64,
    /// Number of successful writes.
    pub writes: u64,
    /// Number of entries aged by stale marks.
    pub stale_marks: u64,
    /// Number of entries currently held.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters backing [`CacheStats`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    stale_marks: AtomicU64,
}

impl StatsRecorder {
    pub fn record_read(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_marks(&self, count: u64) {
        self.stale_marks.fetch_add(count, Ordering::Relaxed);
    }

    /// Snapshot the counters, pairing them with the backend's entry count.
    pub fn snapshot(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            stale_marks: self.stale_marks.load(Ordering::Relaxed),
            entry_count,
        }
    }
}
