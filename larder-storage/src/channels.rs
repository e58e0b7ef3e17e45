//! Per-key hot channels backing live cache reads.
//!
//! Each key owns one `watch` channel holding its latest snapshot. Readers
//! subscribe to the channel, so every reader of a key sees the same sequence
//! of values, and a reader that subscribes late still gets the current one.
//! Channels are never removed: entries are only ever replaced or aged.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;
use larder_core::{CachedData, Cacheable, StoreKey};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::traits::CacheReadStream;

/// Sender half holding the latest snapshot for one key.
pub type SnapshotSender<K, T> = watch::Sender<Option<CachedData<K, T>>>;

/// Registry of hot snapshot channels, one per key.
#[derive(Debug)]
pub struct KeyedChannels<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    senders: DashMap<K, SnapshotSender<K, T>>,
}

impl<K, T> Default for KeyedChannels<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    fn default() -> Self {
        Self {
            senders: DashMap::new(),
        }
    }
}

impl<K, T> KeyedChannels<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `key`, creating its channel from `load` on first use.
    ///
    /// `load` runs under the key's lock, so a concurrent
    /// [`KeyedChannels::with_sender`] cannot slip a write in between loading
    /// and publishing.
    pub fn subscribe_or_load<F>(&self, key: &K, load: F) -> watch::Receiver<Option<CachedData<K, T>>>
    where
        F: FnOnce() -> Option<CachedData<K, T>>,
    {
        self.senders
            .entry(key.clone())
            .or_insert_with(|| watch::channel(load()).0)
            .subscribe()
    }

    /// Run `f` with the key's sender (if a channel exists) while holding the
    /// key's lock.
    pub fn with_sender<R, F>(&self, key: &K, f: F) -> R
    where
        F: FnOnce(Option<&SnapshotSender<K, T>>) -> R,
    {
        match self.senders.entry(key.clone()) {
            Entry::Occupied(entry) => f(Some(entry.get())),
            Entry::Vacant(_vacant) => f(None),
        }
    }

    /// Replace the snapshot for `key`, creating the channel if needed.
    pub fn publish(&self, key: &K, value: Option<CachedData<K, T>>) {
        match self.senders.entry(key.clone()) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(value);
            }
            Entry::Vacant(entry) => {
                entry.insert(watch::channel(value).0);
            }
        }
    }

    /// Age the snapshot for `key`. Returns whether anything changed.
    pub fn mark_stale(&self, key: &K) -> bool {
        self.senders
            .get(key)
            .map(|sender| sender.send_if_modified(age_snapshot))
            .unwrap_or(false)
    }

    /// Age every snapshot. Returns how many changed.
    pub fn mark_all_stale(&self) -> u64 {
        self.senders
            .iter()
            .filter(|sender| sender.send_if_modified(age_snapshot))
            .count() as u64
    }

    /// Current snapshot for `key`, if its channel exists.
    pub fn current(&self, key: &K) -> Option<CachedData<K, T>> {
        self.senders
            .get(key)
            .and_then(|sender| sender.borrow().clone())
    }

    /// Number of keys currently holding a snapshot.
    pub fn populated(&self) -> u64 {
        self.senders
            .iter()
            .filter(|sender| sender.borrow().is_some())
            .count() as u64
    }
}

/// Wrap a receiver into a stream yielding the current value, then every change.
pub fn into_read_stream<K, T>(receiver: watch::Receiver<Option<CachedData<K, T>>>) -> CacheReadStream<K, T>
where
    K: StoreKey,
    T: Cacheable,
{
    WatchStream::new(receiver).boxed()
}

fn age_snapshot<K: Clone, T: Clone>(snapshot: &mut Option<CachedData<K, T>>) -> bool {
    match snapshot {
        Some(cached) if !cached.is_marked_stale() => {
            *cached = cached.marked_stale();
            true
        }
        _ => false,
    }
}
