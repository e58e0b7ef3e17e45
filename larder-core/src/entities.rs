//! Persisted snapshot type

use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch.
pub type Timestamp = i64;

/// `last_fetched` value written when an entry is marked stale.
///
/// Any positive freshness window considers an entry fetched at the epoch
/// stale, so marking stale never needs to delete the value.
pub const STALE_TIMESTAMP: Timestamp = 0;

/// One persisted snapshot of a cached resource.
///
/// Snapshots are immutable: every write produces a new instance carrying its
/// own `last_fetched` stamp, and the previous one is replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedData<K, T> {
    key: K,
    data: T,
    last_fetched: Timestamp,
}

impl<K, T> CachedData<K, T> {
    pub fn new(key: K, data: T, last_fetched: Timestamp) -> Self {
        Self {
            key,
            data,
            last_fetched,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// When the data was written, in unix milliseconds.
    pub fn last_fetched(&self) -> Timestamp {
        self.last_fetched
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn into_parts(self) -> (K, T, Timestamp) {
        (self.key, self.data, self.last_fetched)
    }

    /// Copy of this snapshot aged to [`STALE_TIMESTAMP`].
    pub fn marked_stale(&self) -> Self
    where
        K: Clone,
        T: Clone,
    {
        Self {
            key: self.key.clone(),
            data: self.data.clone(),
            last_fetched: STALE_TIMESTAMP,
        }
    }

    /// Whether this snapshot has been aged by [`CachedData::marked_stale`].
    pub fn is_marked_stale(&self) -> bool {
        self.last_fetched == STALE_TIMESTAMP
    }

    /// Age of the snapshot relative to `now`, or `None` if `now` is earlier
    /// than the write time (clock rollback).
    pub fn age_at(&self, now: Timestamp) -> Option<std::time::Duration> {
        now.checked_sub(self.last_fetched)
            .filter(|millis| *millis >= 0)
            .map(|millis| std::time::Duration::from_millis(millis as u64))
    }
}
