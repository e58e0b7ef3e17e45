//! Larder Test Utilities
//!
//! Centralized test infrastructure for the larder workspace:
//! - Scripted fetchers with call counting and gating
//! - Proptest generators for the data model
//! - Test fixtures for common scenarios
//! - Stream assertions with timeouts
//! - Tracing setup for tests

pub use larder_core::{
    CachedData, Cacheable, FetcherResult, KeyedStoreRequest, ManualClock, RefreshStrategy,
    StoreConfig, StoreResponse, Timestamp,
};
pub use larder_storage::InMemoryCache;

use async_trait::async_trait;
use larder_core::StoreKey;
use larder_store::Fetcher;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-writer subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to debug output for the larder crates.
pub fn init_test_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("larder_store=debug,larder_storage=debug,warn"));

    // Another test may have installed it already.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// MOCK FETCHERS
// ============================================================================

/// Fetcher replaying scripted results.
///
/// Queued results are returned in order; once the queue is empty every call
/// returns the fallback. A closed gate holds fetches open until it is opened,
/// which lets tests observe in-flight and cancelled fetches.
#[derive(Debug)]
pub struct ScriptedFetcher<T, E> {
    script: Mutex<VecDeque<FetcherResult<E, T>>>,
    fallback: FetcherResult<E, T>,
    delay: Option<Duration>,
    gate: watch::Sender<bool>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl<T, E> ScriptedFetcher<T, E>
where
    T: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    pub fn new(fallback: FetcherResult<E, T>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            gate,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    /// Always succeed with `value`.
    pub fn succeeding(value: T) -> Self {
        Self::new(FetcherResult::Success(value))
    }

    /// Always fail with `error`.
    pub fn failing(error: E) -> Self {
        Self::new(FetcherResult::Failure(error))
    }

    /// Queue a result ahead of the fallback.
    pub fn then_respond(self, result: FetcherResult<E, T>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Start with the gate closed.
    pub fn gated(self) -> Self {
        self.close_gate();
        self
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    /// Calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that returned a result.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Calls dropped before returning.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` calls have started. Returns false on timeout.
    pub async fn wait_for_calls(&self, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.calls() >= n).await
    }

    /// Wait until at least `n` calls were cancelled. Returns false on timeout.
    pub async fn wait_for_cancelled(&self, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.cancelled() >= n).await
    }

    fn next_result(&self) -> FetcherResult<E, T> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Counts a fetch as cancelled unless disarmed.
struct CancelGuard<'a> {
    cancelled: &'a AtomicUsize,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl<K, T, E> Fetcher<K, T, E> for ScriptedFetcher<T, E>
where
    K: StoreKey,
    T: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    async fn fetch(&self, _key: &K) -> FetcherResult<E, T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = CancelGuard {
            cancelled: &self.cancelled,
            armed: true,
        };

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        guard.armed = false;
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.next_result()
    }
}

async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use crate::fixtures::TestItem;
    use proptest::prelude::*;

    /// Generate a plausible unix-millis timestamp (2001 to 2100).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        1_000_000_000_000i64..4_102_444_800_000i64
    }

    pub fn arb_test_item() -> impl Strategy<Value = TestItem> {
        (any::<u32>(), "[a-z ]{0,24}").prop_map(|(id, name)| TestItem { id, name })
    }

    pub fn arb_items(max: usize) -> impl Strategy<Value = Vec<TestItem>> {
        prop::collection::vec(arb_test_item(), 0..=max)
    }

    pub fn arb_refresh_strategy() -> impl Strategy<Value = RefreshStrategy> {
        prop_oneof![
            Just(RefreshStrategy::RefreshIfStale),
            Just(RefreshStrategy::ForceRefresh),
            (0u64..86_400).prop_map(|secs| RefreshStrategy::RefreshIfOlderThan(Duration::from_secs(secs))),
        ]
    }

    pub fn arb_cached_item() -> impl Strategy<Value = CachedData<u32, TestItem>> {
        (any::<u32>(), arb_test_item(), arb_timestamp())
            .prop_map(|(key, item, at)| CachedData::new(key, item, at))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// A cached record keyed by id.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TestItem {
        pub id: u32,
        pub name: String,
    }

    impl Cacheable for TestItem {}

    /// Fetch failure used across store tests.
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum TestError {
        #[error("network unavailable")]
        Network,
        #[error("illegal state: {0}")]
        IllegalState(String),
    }

    pub fn item(id: u32, name: &str) -> TestItem {
        TestItem {
            id,
            name: name.to_string(),
        }
    }

    pub fn items(count: u32) -> Vec<TestItem> {
        (0..count).map(|id| item(id, &format!("item-{id}"))).collect()
    }

    /// Fixed "now" used with [`ManualClock`] in store tests.
    pub const NOW: Timestamp = 1_700_000_000_000;

    pub fn clock_at_now() -> std::sync::Arc<ManualClock> {
        std::sync::Arc::new(ManualClock::new(NOW))
    }

    /// Store config with a one hour window.
    pub fn store_config(store_id: &str) -> StoreConfig {
        StoreConfig::new(store_id).with_freshness_window(Duration::from_secs(3600))
    }
}

// ============================================================================
// STREAM ASSERTIONS
// ============================================================================

pub mod assertions {
    use futures_util::{Stream, StreamExt};
    use std::fmt::Debug;
    use std::time::Duration;

    /// How long to wait for an expected emission.
    pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

    /// How long silence must last to count as "no emission".
    pub const QUIET_PERIOD: Duration = Duration::from_millis(50);

    /// Await the next item, panicking on timeout or stream end.
    #[track_caller]
    pub fn next_item<S>(stream: &mut S) -> impl std::future::Future<Output = S::Item> + '_
    where
        S: Stream + Unpin,
    {
        let caller = std::panic::Location::caller();
        async move {
            match tokio::time::timeout(EVENT_TIMEOUT, stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => panic!("stream ended unexpectedly (at {caller})"),
                Err(_) => panic!("no emission within {EVENT_TIMEOUT:?} (at {caller})"),
            }
        }
    }

    /// Await the next `count` items.
    pub async fn next_items<S>(stream: &mut S, count: usize) -> Vec<S::Item>
    where
        S: Stream + Unpin,
    {
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(next_item(stream).await);
        }
        items
    }

    /// Assert nothing is emitted for [`QUIET_PERIOD`].
    pub async fn assert_quiet<S>(stream: &mut S)
    where
        S: Stream + Unpin,
        S::Item: Debug,
    {
        if let Ok(item) = tokio::time::timeout(QUIET_PERIOD, stream.next()).await {
            panic!("expected no emission, got {:?}", item);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
