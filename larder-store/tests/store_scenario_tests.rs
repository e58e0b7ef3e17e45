//! Scenario Tests for Cache-Then-Network Stores
//!
//! End-to-end request flows through a `RealStore` backed by the in-memory
//! cache, the LMDB cache, and a notification hub.

use larder_core::{PersistenceConfig, ResetConfig};
use larder_store::{
    Cache, CachedData, KeyedStore, KeyedStoreRequest, NotificationHub, RealStore, StoreResponse,
    StoreResponseStreamExt,
};
use larder_storage::{InMemoryCache, LmdbCache, LmdbEnvironment};
use larder_test_utils::assertions::{assert_quiet, next_item, next_items};
use larder_test_utils::fixtures::{clock_at_now, item, store_config, TestError, TestItem, NOW};
use larder_test_utils::{init_test_tracing, FetcherResult, ManualClock, ScriptedFetcher};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

type ItemStore = RealStore<u32, TestItem, TestError>;

fn build_store(
    fetcher: &Arc<ScriptedFetcher<TestItem, TestError>>,
    cache: Arc<dyn Cache<u32, TestItem>>,
    clock: &Arc<ManualClock>,
) -> ItemStore {
    init_test_tracing();
    RealStore::<u32, TestItem, TestError>::builder(store_config("items"), fetcher.clone(), cache)
        .clock(clock.clone())
        .build()
        .unwrap()
}

// ============================================================================
// CACHED REQUESTS
// ============================================================================

/// An empty cache fetches, writes, and surfaces the fetched value.
#[tokio::test]
async fn test_cached_without_entry_fetches() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(1, "fetched")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::new());
    let store = build_store(&fetcher, cache.clone(), &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::cached(1, false));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![StoreResponse::Loading, StoreResponse::Data(item(1, "fetched"))]
    );

    assert_eq!(fetcher.calls(), 1);
    let written = cache.peek(&1).unwrap();
    assert_eq!(written.data(), &item(1, "fetched"));
    assert_eq!(written.last_fetched(), NOW);
}

/// A fresh entry is served from the cache and the fetcher is never invoked.
#[tokio::test]
async fn test_cached_with_fresh_entry_skips_fetch() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(1, "remote")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::with_entries([CachedData::new(
        1,
        item(1, "cached"),
        NOW - 1_000,
    )]));
    let store = build_store(&fetcher, cache, &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::cached(1, false));
    assert_eq!(next_item(&mut stream).await, StoreResponse::Data(item(1, "cached")));
    assert_quiet(&mut stream).await;
    assert_eq!(fetcher.calls(), 0);
}

/// Force refresh serves the cached entry, then loads, then the new value.
#[tokio::test]
async fn test_cached_force_refresh_serves_cache_first() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(1, "remote")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::with_entries([CachedData::new(
        1,
        item(1, "cached"),
        NOW - 1_000,
    )]));
    let store = build_store(&fetcher, cache, &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::cached(1, true));
    assert_eq!(
        next_items(&mut stream, 3).await,
        vec![
            StoreResponse::Data(item(1, "cached")),
            StoreResponse::Loading,
            StoreResponse::Data(item(1, "remote")),
        ]
    );
    assert_eq!(fetcher.calls(), 1);
}

/// An entry older than the window is not surfaced before the refetch.
#[tokio::test]
async fn test_cached_expired_entry_refetches() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(1, "remote")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::with_entries([CachedData::new(
        1,
        item(1, "old"),
        NOW - 2 * 3_600_000,
    )]));
    let store = build_store(&fetcher, cache, &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::cached(1, false));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![StoreResponse::Loading, StoreResponse::Data(item(1, "remote"))]
    );
}

/// An empty collection counts as never fetched.
#[tokio::test]
async fn test_cached_empty_collection_refetches() {
    init_test_tracing();
    let fetcher = Arc::new(ScriptedFetcher::<Vec<TestItem>, TestError>::succeeding(vec![item(
        1, "one",
    )]));
    let cache = Arc::new(InMemoryCache::<(), Vec<TestItem>>::with_entries([CachedData::new(
        (),
        Vec::new(),
        NOW,
    )]));
    let store = RealStore::<(), Vec<TestItem>, TestError>::builder(
        store_config("item-list"),
        fetcher.clone(),
        cache,
    )
    .clock(clock_at_now())
    .build()
    .unwrap();

    let mut stream = store.stream(KeyedStoreRequest::cached((), false));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![StoreResponse::Loading, StoreResponse::Data(vec![item(1, "one")])]
    );
    assert_eq!(fetcher.calls(), 1);
}

/// `RefreshIfOlderThan` refetches a fresh entry once it passes the given age.
#[tokio::test]
async fn test_cached_refresh_if_older_than() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(1, "remote")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::with_entries([CachedData::new(
        1,
        item(1, "cached"),
        NOW - 60_000,
    )]));
    let store = build_store(&fetcher, cache, &clock_at_now());

    let mut young_enough = store.stream(KeyedStoreRequest::cached_with(
        1,
        larder_store::RefreshStrategy::RefreshIfOlderThan(Duration::from_secs(300)),
    ));
    assert_eq!(next_item(&mut young_enough).await, StoreResponse::Data(item(1, "cached")));
    assert_quiet(&mut young_enough).await;
    assert_eq!(fetcher.calls(), 0);

    let mut too_old = store.stream(KeyedStoreRequest::cached_with(
        1,
        larder_store::RefreshStrategy::RefreshIfOlderThan(Duration::from_secs(30)),
    ));
    assert_eq!(
        next_items(&mut too_old, 3).await,
        vec![
            StoreResponse::Data(item(1, "cached")),
            StoreResponse::Loading,
            StoreResponse::Data(item(1, "remote")),
        ]
    );
}

// ============================================================================
// FRESH REQUESTS
// ============================================================================

/// A failed fresh fetch surfaces the error, and later cache writes still flow.
#[tokio::test]
async fn test_fresh_failure_then_cache_write() {
    let fetcher = Arc::new(ScriptedFetcher::failing(TestError::IllegalState(
        "bad response".to_string(),
    )));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::new());
    let store = build_store(&fetcher, cache.clone(), &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::fresh(123));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![
            StoreResponse::Loading,
            StoreResponse::Error(TestError::IllegalState("bad response".to_string())),
        ]
    );

    let (update, written) = tokio::join!(next_item(&mut stream), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.write(CachedData::new(123, item(123, "X"), NOW)).await
    });
    written.unwrap();
    assert_eq!(update, StoreResponse::Data(item(123, "X")));
}

/// A fresh request fetches even when the cache holds a fresh entry.
#[tokio::test]
async fn test_fresh_ignores_cached_entry() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(1, "remote")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::with_entries([CachedData::new(
        1,
        item(1, "cached"),
        NOW,
    )]));
    let store = build_store(&fetcher, cache.clone(), &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::fresh(1));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![StoreResponse::Loading, StoreResponse::Data(item(1, "remote"))]
    );
    assert_quiet(&mut stream).await;
    assert_eq!(cache.peek(&1).unwrap().data(), &item(1, "remote"));
}

/// `first_outcome` resolves to the fetched value.
#[tokio::test]
async fn test_fresh_first_outcome() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(9, "nine")));
    let store = build_store(&fetcher, Arc::new(InMemoryCache::<u32, TestItem>::new()), &clock_at_now());

    let outcome = store.stream(KeyedStoreRequest::fresh(9)).first_outcome().await;
    assert_eq!(outcome, Some(Ok(item(9, "nine"))));
}

/// A write landing before the consumer polls again after a failure is delivered.
#[tokio::test]
async fn test_fresh_failure_sees_write_made_before_next_poll() {
    let fetcher = Arc::new(ScriptedFetcher::failing(TestError::Network));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::new());
    let store = build_store(&fetcher, cache.clone(), &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::fresh(123));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![StoreResponse::Loading, StoreResponse::Error(TestError::Network)]
    );

    cache
        .write(CachedData::new(123, item(123, "X"), NOW + 1))
        .await
        .unwrap();
    assert_eq!(next_item(&mut stream).await, StoreResponse::Data(item(123, "X")));
}

/// A write landing before the consumer polls again after a success is delivered.
#[tokio::test]
async fn test_fresh_success_sees_write_made_before_next_poll() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(123, "v1")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::new());
    let store = build_store(&fetcher, cache.clone(), &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::fresh(123));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![StoreResponse::Loading, StoreResponse::Data(item(123, "v1"))]
    );

    cache
        .write(CachedData::new(123, item(123, "X"), NOW + 1))
        .await
        .unwrap();
    assert_eq!(next_item(&mut stream).await, StoreResponse::Data(item(123, "X")));
    assert_quiet(&mut stream).await;
}

/// Stale marks and identical rewrites do not repeat data on a fresh stream.
#[tokio::test]
async fn test_fresh_collapses_identical_updates() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(5, "fetched")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::new());
    let store = build_store(&fetcher, cache.clone(), &clock_at_now());

    let mut stream = store.stream(KeyedStoreRequest::fresh(5));
    assert_eq!(
        next_items(&mut stream, 2).await,
        vec![StoreResponse::Loading, StoreResponse::Data(item(5, "fetched"))]
    );

    store.mark_as_stale(&5).await.unwrap();
    assert_quiet(&mut stream).await;

    cache
        .write(CachedData::new(5, item(5, "fetched"), NOW + 1))
        .await
        .unwrap();
    assert_quiet(&mut stream).await;

    cache
        .write(CachedData::new(5, item(5, "changed"), NOW + 2))
        .await
        .unwrap();
    assert_eq!(next_item(&mut stream).await, StoreResponse::Data(item(5, "changed")));
}

// ============================================================================
// STALENESS
// ============================================================================

/// Marking a key stale forces the next cached request to refetch.
#[tokio::test]
async fn test_mark_as_stale_forces_refetch() {
    let fetcher = Arc::new(
        ScriptedFetcher::succeeding(item(1, "third"))
            .then_respond(FetcherResult::Success(item(1, "first")))
            .then_respond(FetcherResult::Success(item(1, "second"))),
    );
    let store = build_store(&fetcher, Arc::new(InMemoryCache::<u32, TestItem>::new()), &clock_at_now());

    let first: Vec<_> = next_items(&mut store.stream(KeyedStoreRequest::cached(1, false)), 2).await;
    assert_eq!(first, vec![StoreResponse::Loading, StoreResponse::Data(item(1, "first"))]);

    let mut within_window = store.stream(KeyedStoreRequest::cached(1, false));
    assert_eq!(next_item(&mut within_window).await, StoreResponse::Data(item(1, "first")));
    assert_quiet(&mut within_window).await;
    assert_eq!(fetcher.calls(), 1);
    drop(within_window);

    store.mark_as_stale(&1).await.unwrap();

    let refreshed: Vec<_> =
        next_items(&mut store.stream(KeyedStoreRequest::cached(1, false)), 2).await;
    assert_eq!(
        refreshed,
        vec![StoreResponse::Loading, StoreResponse::Data(item(1, "second"))]
    );
    assert_eq!(fetcher.calls(), 2);
}

/// Marking every key stale affects only keys that have entries.
#[tokio::test]
async fn test_mark_all_as_stale_counts_entries() {
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(0, "remote")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::with_entries([
        CachedData::new(1, item(1, "one"), NOW),
        CachedData::new(2, item(2, "two"), NOW),
    ]));
    let store = build_store(&fetcher, cache.clone(), &clock_at_now());

    assert_eq!(store.mark_all_as_stale().await.unwrap(), 2);
    assert!(cache.peek(&1).unwrap().is_marked_stale());
    assert!(cache.peek(&2).unwrap().is_marked_stale());
    assert_eq!(store.mark_all_as_stale().await.unwrap(), 0);
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// A configured notification event resets the store's cache.
#[tokio::test]
async fn test_notification_resets_cache() {
    init_test_tracing();
    let hub = NotificationHub::default();
    let fetcher = Arc::new(ScriptedFetcher::<TestItem, TestError>::succeeding(item(1, "remote")));
    let cache = Arc::new(InMemoryCache::<u32, TestItem>::with_entries([CachedData::new(
        1,
        item(1, "cached"),
        NOW,
    )]));
    let store = RealStore::<u32, TestItem, TestError>::builder(
        store_config("balances").with_reset(ResetConfig::on(["transaction-completed"])),
        fetcher.clone(),
        cache.clone(),
    )
    .clock(clock_at_now())
    .notifications(&hub)
    .build()
    .unwrap();

    hub.post("login");
    hub.post("transaction-completed");

    let reset = tokio::time::timeout(Duration::from_secs(2), async {
        while !cache.peek(&1).is_some_and(|cached| cached.is_marked_stale()) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(reset.is_ok(), "cache was not reset by notification");

    let refreshed: Vec<_> =
        next_items(&mut store.stream(KeyedStoreRequest::cached(1, false)), 2).await;
    assert_eq!(
        refreshed,
        vec![StoreResponse::Loading, StoreResponse::Data(item(1, "remote"))]
    );
}

/// Dropping the store stops its reset listener.
#[tokio::test]
async fn test_dropped_store_stops_listening() {
    let hub = NotificationHub::default();
    let fetcher = Arc::new(ScriptedFetcher::<TestItem, TestError>::succeeding(item(1, "remote")));
    let store = RealStore::<u32, TestItem, TestError>::builder(
        store_config("balances").with_reset(ResetConfig::on(["logout"])),
        fetcher,
        Arc::new(InMemoryCache::<u32, TestItem>::new()),
    )
    .notifications(&hub)
    .build()
    .unwrap();

    assert_eq!(hub.receiver_count(), 1);
    drop(store);

    let released = tokio::time::timeout(Duration::from_secs(2), async {
        while hub.receiver_count() > 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "reset listener outlived its store");
}

// ============================================================================
// LMDB-BACKED STORES
// ============================================================================

/// Fetched values persist in LMDB and serve later stores without fetching.
#[tokio::test]
async fn test_lmdb_store_serves_persisted_entries() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let env = LmdbEnvironment::open(&PersistenceConfig::new(dir.path()).with_max_size_mb(16)).unwrap();
    let clock = clock_at_now();

    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(7, "persisted")));
    let first = build_store(
        &fetcher,
        Arc::new(LmdbCache::<u32, TestItem>::new(env.clone(), "items")),
        &clock,
    );
    let fetched: Vec<_> = next_items(&mut first.stream(KeyedStoreRequest::cached(7, false)), 2).await;
    assert_eq!(
        fetched,
        vec![StoreResponse::Loading, StoreResponse::Data(item(7, "persisted"))]
    );
    drop(first);

    let offline = Arc::new(ScriptedFetcher::failing(TestError::Network));
    let second = build_store(
        &offline,
        Arc::new(LmdbCache::<u32, TestItem>::new(env, "items")),
        &clock,
    );
    let mut stream = second.stream(KeyedStoreRequest::cached(7, false));
    assert_eq!(next_item(&mut stream).await, StoreResponse::Data(item(7, "persisted")));
    assert_quiet(&mut stream).await;
    assert_eq!(offline.calls(), 0);
}

/// A stale mark on an LMDB entry survives into a new cache instance.
#[tokio::test]
async fn test_lmdb_stale_mark_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    let env = LmdbEnvironment::open_path(dir.path(), 16).unwrap();
    let clock = clock_at_now();

    let seeded = LmdbCache::<u32, TestItem>::new(env.clone(), "items");
    seeded
        .write(CachedData::new(3, item(3, "seeded"), NOW))
        .await
        .unwrap();
    let fetcher = Arc::new(ScriptedFetcher::succeeding(item(3, "refetched")));
    let store = build_store(&fetcher, Arc::new(seeded), &clock);
    store.mark_as_stale(&3).await.unwrap();
    drop(store);

    let store = build_store(
        &fetcher,
        Arc::new(LmdbCache::<u32, TestItem>::new(env, "items")),
        &clock,
    );
    let refreshed: Vec<_> =
        next_items(&mut store.stream(KeyedStoreRequest::cached(3, false)), 2).await;
    assert_eq!(
        refreshed,
        vec![StoreResponse::Loading, StoreResponse::Data(item(3, "refetched"))]
    );
}
