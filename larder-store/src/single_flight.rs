//! In-flight fetch deduplication.
//!
//! Concurrent requests for the same key share one fetch. The registry only
//! holds weak handles: the fetch lives as long as some subscriber polls it,
//! and dropping the last subscriber cancels it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use larder_core::StoreKey;

/// Outcome of one shared fetch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<E, T> {
    /// Fetched and persisted; readers receive the value through the cache.
    Written(T),
    /// Fetched but the cache write failed; the value only exists here.
    Unpersisted(T),
    /// The fetcher reported a failure.
    Failed(E),
}

/// Handle to a fetch shared between subscribers.
pub type SharedFetch<E, T> = Shared<BoxFuture<'static, FetchOutcome<E, T>>>;

struct InFlight<E, T> {
    generation: u64,
    handle: WeakShared<BoxFuture<'static, FetchOutcome<E, T>>>,
}

/// Per-store registry of in-flight fetches.
pub struct SingleFlight<K, E, T>
where
    K: StoreKey,
{
    in_flight: Arc<DashMap<K, InFlight<E, T>>>,
    next_generation: AtomicU64,
}

impl<K, E, T> Default for SingleFlight<K, E, T>
where
    K: StoreKey,
{
    fn default() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }
}

impl<K, E, T> SingleFlight<K, E, T>
where
    K: StoreKey,
    E: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the fetch in flight for `key`, or start one with `start`.
    ///
    /// Returns the shared handle and whether an existing fetch was joined.
    /// `start` only builds the future; nothing runs until a handle is polled.
    pub fn join<F>(&self, key: &K, start: F) -> (SharedFetch<E, T>, bool)
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutcome<E, T>>,
    {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if let Some(shared) = entry.get().handle.upgrade() {
                    return (shared, true);
                }
                let (shared, in_flight) = self.launch(key, start);
                if let Some(in_flight) = in_flight {
                    entry.insert(in_flight);
                } else {
                    entry.remove();
                }
                (shared, false)
            }
            Entry::Vacant(entry) => {
                let (shared, in_flight) = self.launch(key, start);
                if let Some(in_flight) = in_flight {
                    entry.insert(in_flight);
                }
                (shared, false)
            }
        }
    }

    /// Number of keys with a fetch registered.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    fn launch<F>(&self, key: &K, start: F) -> (SharedFetch<E, T>, Option<InFlight<E, T>>)
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutcome<E, T>>,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let guard = RemoveOnDrop {
            in_flight: self.in_flight.clone(),
            key: key.clone(),
            generation,
        };

        let fetch = start();
        let shared = async move {
            let outcome = fetch.await;
            // Evict before resolving so late joiners start a new fetch.
            drop(guard);
            outcome
        }
        .boxed()
        .shared();

        let in_flight = shared.downgrade().map(|handle| InFlight { generation, handle });
        (shared, in_flight)
    }
}

/// Removes a registry entry when its fetch completes or is dropped.
struct RemoveOnDrop<K, E, T>
where
    K: StoreKey,
{
    in_flight: Arc<DashMap<K, InFlight<E, T>>>,
    key: K,
    generation: u64,
}

impl<K, E, T> Drop for RemoveOnDrop<K, E, T>
where
    K: StoreKey,
{
    fn drop(&mut self) {
        let generation = self.generation;
        self.in_flight
            .remove_if(&self.key, |_, entry| entry.generation == generation);
    }
}
