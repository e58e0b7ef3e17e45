//! Fetch decision policies.
//!
//! A mediator looks at the first cached snapshot of a `Cached` request and
//! decides whether the store must go to the network. Decisions are pure and
//! never suspend.

use std::sync::Arc;
use std::time::Duration;

use larder_core::clock::duration_millis;
use larder_core::{CachedData, Cacheable, Clock, SystemClock};

/// Decides whether a cached snapshot must be refreshed.
pub trait Mediator<K, T>: Send + Sync {
    fn should_fetch(&self, cached: Option<&CachedData<K, T>>) -> bool;
}

impl<K, T, F> Mediator<K, T> for F
where
    F: Fn(Option<&CachedData<K, T>>) -> bool + Send + Sync,
{
    fn should_fetch(&self, cached: Option<&CachedData<K, T>>) -> bool {
        self(cached)
    }
}

/// Time-window policy.
///
/// Fetches when:
/// - nothing is cached
/// - the cached value is an empty collection
/// - the clock reads earlier than the write (rollback, the stamp is untrusted)
/// - the snapshot is older than the freshness window
pub struct FreshnessMediator {
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FreshnessMediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessMediator")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl FreshnessMediator {
    /// Window-based mediator on the system clock.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { window, clock }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl<K, T> Mediator<K, T> for FreshnessMediator
where
    T: Cacheable,
{
    fn should_fetch(&self, cached: Option<&CachedData<K, T>>) -> bool {
        let Some(cached) = cached else {
            return true;
        };
        if cached.data().is_empty_collection() {
            return true;
        }

        let now = self.clock.now_millis();
        let last_fetched = cached.last_fetched();
        now < last_fetched || now > last_fetched.saturating_add(duration_millis(self.window))
    }
}
