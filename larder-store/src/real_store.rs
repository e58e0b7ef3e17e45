//! The store orchestrator.
//!
//! A [`RealStore`] ties a [`Fetcher`], a [`Cache`] and a [`Mediator`]
//! together and turns each request into a long-lived stream of
//! [`StoreResponse`]s:
//!
//! - `Cached` requests serve the cache, fetch when the refresh strategy asks
//!   for it, and receive fetched data back through the cache.
//! - `Fresh` requests always fetch, emit the result directly, then follow the
//!   cache for later writes.
//!
//! Fetch failures are local to one attempt. Streams stay subscribed to the
//! cache until the subscriber drops them.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, StreamExt};
use larder_core::clock::duration_millis;
use larder_core::{
    CachedData, Cacheable, Clock, FetcherResult, KeyedStoreRequest, RefreshStrategy, StoreConfig,
    StoreErrorValue, StoreKey, StoreResponse, StoreResult, SystemClock,
};
use larder_storage::Cache;
use tracing::{debug, error, warn};

use crate::fetcher::Fetcher;
use crate::mediator::{FreshnessMediator, Mediator};
use crate::notifications::{NotificationHub, ResetListener};
use crate::single_flight::{FetchOutcome, SharedFetch, SingleFlight};

/// A store serving one resource per key.
#[async_trait]
pub trait KeyedStore<K, T, E>: Send + Sync
where
    K: StoreKey,
{
    /// Stream the state of `request.key()`.
    ///
    /// The stream never completes on its own; drop it to unsubscribe. Dropping
    /// the last subscriber of an in-flight fetch cancels that fetch.
    fn stream(&self, request: KeyedStoreRequest<K>) -> BoxStream<'static, StoreResponse<E, T>>;

    /// Make the next `Cached` request for `key` refetch.
    async fn mark_as_stale(&self, key: &K) -> StoreResult<()>;

    /// Make the next `Cached` request for every key refetch.
    async fn mark_all_as_stale(&self) -> StoreResult<u64>;
}

struct StoreInner<K, T, E>
where
    K: StoreKey,
{
    config: StoreConfig,
    fetcher: Arc<dyn Fetcher<K, T, E>>,
    cache: Arc<dyn Cache<K, T>>,
    mediator: Arc<dyn Mediator<K, T>>,
    clock: Arc<dyn Clock>,
    flights: SingleFlight<K, E, T>,
}

/// Builder for [`RealStore`].
///
/// Defaults: [`SystemClock`], a [`FreshnessMediator`] over the configured
/// freshness window, no notification hub.
pub struct StoreBuilder<K, T, E>
where
    K: StoreKey,
{
    config: StoreConfig,
    fetcher: Arc<dyn Fetcher<K, T, E>>,
    cache: Arc<dyn Cache<K, T>>,
    mediator: Option<Arc<dyn Mediator<K, T>>>,
    clock: Option<Arc<dyn Clock>>,
    hub: Option<NotificationHub>,
}

impl<K, T, E> StoreBuilder<K, T, E>
where
    K: StoreKey,
    T: Cacheable,
    E: StoreErrorValue,
{
    pub fn mediator(mut self, mediator: Arc<dyn Mediator<K, T>>) -> Self {
        self.mediator = Some(mediator);
        self
    }

    /// Clock used to stamp writes and by the default mediator.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Listen on `hub` for the configured reset events.
    pub fn notifications(mut self, hub: &NotificationHub) -> Self {
        self.hub = Some(hub.clone());
        self
    }

    /// Validate the configuration and build the store.
    ///
    /// Must be called within a Tokio runtime when a hub with reset events is
    /// configured, since the reset listener is spawned here.
    pub fn build(self) -> StoreResult<RealStore<K, T, E>> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let mediator = self.mediator.unwrap_or_else(|| {
            Arc::new(FreshnessMediator::with_clock(
                self.config.freshness_window,
                clock.clone(),
            ))
        });

        let reset_listener = self.hub.as_ref().and_then(|hub| {
            ResetListener::spawn(
                hub,
                self.config.reset.clone(),
                self.cache.clone(),
                self.config.store_id.clone(),
            )
        });

        debug!(
            store_id = %self.config.store_id,
            freshness_window_secs = self.config.freshness_window.as_secs(),
            reset_events = reset_listener.is_some(),
            "Built store"
        );

        Ok(RealStore {
            inner: Arc::new(StoreInner {
                config: self.config,
                fetcher: self.fetcher,
                cache: self.cache,
                mediator,
                clock,
                flights: SingleFlight::new(),
            }),
            _reset_listener: reset_listener,
        })
    }
}

/// Cache-then-network store for one resource type.
///
/// # Example
///
/// ```ignore
/// let store = RealStore::builder(
///     StoreConfig::new("balances").with_freshness_window(Duration::from_secs(300)),
///     Arc::new(fetcher_fn(|account: AccountId| api.balance(account))),
///     Arc::new(InMemoryCache::new()),
/// )
/// .build()?;
///
/// let mut balances = store.stream(KeyedStoreRequest::cached(account, false));
/// while let Some(response) = balances.next().await { render(response) }
/// ```
pub struct RealStore<K, T, E>
where
    K: StoreKey,
{
    inner: Arc<StoreInner<K, T, E>>,
    _reset_listener: Option<ResetListener>,
}

impl<K, T, E> RealStore<K, T, E>
where
    K: StoreKey,
    T: Cacheable,
    E: StoreErrorValue,
{
    pub fn builder(
        config: StoreConfig,
        fetcher: Arc<dyn Fetcher<K, T, E>>,
        cache: Arc<dyn Cache<K, T>>,
    ) -> StoreBuilder<K, T, E> {
        StoreBuilder {
            config,
            fetcher,
            cache,
            mediator: None,
            clock: None,
            hub: None,
        }
    }

    /// Store with an explicit mediator on the system clock.
    pub fn new(
        config: StoreConfig,
        fetcher: Arc<dyn Fetcher<K, T, E>>,
        cache: Arc<dyn Cache<K, T>>,
        mediator: Arc<dyn Mediator<K, T>>,
    ) -> StoreResult<Self> {
        Self::builder(config, fetcher, cache).mediator(mediator).build()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Number of keys with a fetch in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.len()
    }

    fn cached_stream(&self, key: K, refresh: RefreshStrategy) -> BoxStream<'static, StoreResponse<E, T>> {
        let inner = self.inner.clone();

        stream! {
            let mut updates = inner.cache.read(&key);
            let mut cache_open = true;
            let first = match updates.next().await {
                Some(first) => first,
                None => {
                    cache_open = false;
                    None
                }
            };

            let stale = inner.mediator.should_fetch(first.as_ref());
            let fetch = inner.needs_refresh(refresh, stale, first.as_ref());
            debug!(
                store_id = %inner.config.store_id,
                key = ?key,
                cached = first.is_some(),
                stale,
                fetch,
                "Cached request"
            );

            let mut last: Option<StoreResponse<E, T>> = None;

            if let Some(cached) = first.filter(|_| !stale) {
                let response = StoreResponse::Data(cached.into_data());
                last = Some(response.clone());
                yield response;
            }

            let mut pending: Option<SharedFetch<E, T>> = None;
            if fetch {
                last = Some(StoreResponse::Loading);
                yield StoreResponse::Loading;
                pending = Some(inner.join_fetch(&key));
            }

            while cache_open || pending.is_some() {
                let event = tokio::select! {
                    outcome = async {
                        match pending.as_mut() {
                            Some(fetch) => fetch.await,
                            None => std::future::pending().await,
                        }
                    }, if pending.is_some() => CachedEvent::Fetched(outcome),
                    update = updates.next(), if cache_open => CachedEvent::Cache(update),
                };

                let response = match event {
                    CachedEvent::Fetched(outcome) => {
                        pending = None;
                        match outcome {
                            // Delivered through the cache read.
                            FetchOutcome::Written(_) => continue,
                            FetchOutcome::Unpersisted(value) => StoreResponse::Data(value),
                            FetchOutcome::Failed(error) => StoreResponse::Error(error),
                        }
                    }
                    CachedEvent::Cache(Some(Some(cached))) => StoreResponse::Data(cached.into_data()),
                    CachedEvent::Cache(Some(None)) => continue,
                    CachedEvent::Cache(None) => {
                        cache_open = false;
                        continue;
                    }
                };

                if last.as_ref() != Some(&response) {
                    last = Some(response.clone());
                    yield response;
                }
            }
        }
        .boxed()
    }

    fn fresh_stream(&self, key: K) -> BoxStream<'static, StoreResponse<E, T>> {
        let inner = self.inner.clone();

        stream! {
            debug!(store_id = %inner.config.store_id, key = ?key, "Fresh request");
            yield StoreResponse::Loading;

            let outcome = inner.join_fetch(&key).await;

            // Subscribe before yielding so writes landing while the consumer
            // holds the outcome are still delivered. The snapshot current at
            // subscribe time is either the value just fetched or one the failed
            // attempt must not surface.
            let mut updates = inner.cache.read(&key);
            let _ = updates.next().await;

            let mut last = match outcome {
                FetchOutcome::Written(value) | FetchOutcome::Unpersisted(value) => {
                    StoreResponse::Data(value)
                }
                FetchOutcome::Failed(error) => StoreResponse::Error(error),
            };
            yield last.clone();

            while let Some(update) = updates.next().await {
                let Some(cached) = update else { continue };
                let response = StoreResponse::Data(cached.into_data());
                if response != last {
                    last = response.clone();
                    yield response;
                }
            }
        }
        .boxed()
    }
}

enum CachedEvent<E, T, K> {
    Fetched(FetchOutcome<E, T>),
    Cache(Option<Option<CachedData<K, T>>>),
}

impl<K, T, E> StoreInner<K, T, E>
where
    K: StoreKey,
    T: Cacheable,
    E: StoreErrorValue,
{
    fn needs_refresh(
        &self,
        refresh: RefreshStrategy,
        stale: bool,
        first: Option<&CachedData<K, T>>,
    ) -> bool {
        match refresh {
            RefreshStrategy::RefreshIfStale => stale,
            RefreshStrategy::ForceRefresh => true,
            RefreshStrategy::RefreshIfOlderThan(max_age) => {
                stale
                    || first.map_or(true, |cached| {
                        let now = self.clock.now_millis();
                        now.saturating_sub(cached.last_fetched()) > duration_millis(max_age)
                    })
            }
        }
    }

    /// Join the in-flight fetch for `key` or start a new one.
    fn join_fetch(&self, key: &K) -> SharedFetch<E, T> {
        let (fetch, joined) = self.flights.join(key, || self.fetch_and_persist(key.clone()));
        if joined {
            debug!(store_id = %self.config.store_id, key = ?key, "Joined in-flight fetch");
        }
        fetch
    }

    fn fetch_and_persist(&self, key: K) -> BoxFuture<'static, FetchOutcome<E, T>> {
        let fetcher = self.fetcher.clone();
        let cache = self.cache.clone();
        let clock = self.clock.clone();
        let store_id = self.config.store_id.clone();

        async move {
            debug!(store_id = %store_id, key = ?key, "Fetch started");
            match fetcher.fetch(&key).await {
                FetcherResult::Success(value) => {
                    let cached = CachedData::new(key.clone(), value.clone(), clock.now_millis());
                    match cache.write(cached).await {
                        Ok(()) => {
                            debug!(store_id = %store_id, key = ?key, "Fetch completed");
                            FetchOutcome::Written(value)
                        }
                        Err(e) => {
                            error!(store_id = %store_id, key = ?key, error = %e, "Failed to persist fetched value");
                            FetchOutcome::Unpersisted(value)
                        }
                    }
                }
                FetcherResult::Failure(e) => {
                    warn!(store_id = %store_id, key = ?key, error = ?e, "Fetch failed");
                    FetchOutcome::Failed(e)
                }
            }
        }
        .boxed()
    }
}

#[async_trait]
impl<K, T, E> KeyedStore<K, T, E> for RealStore<K, T, E>
where
    K: StoreKey,
    T: Cacheable,
    E: StoreErrorValue,
{
    fn stream(&self, request: KeyedStoreRequest<K>) -> BoxStream<'static, StoreResponse<E, T>> {
        match request {
            KeyedStoreRequest::Fresh(key) => self.fresh_stream(key),
            KeyedStoreRequest::Cached { key, refresh } => self.cached_stream(key, refresh),
        }
    }

    async fn mark_as_stale(&self, key: &K) -> StoreResult<()> {
        debug!(store_id = %self.inner.config.store_id, key = ?key, "Marking stale");
        self.inner.cache.mark_as_stale(key).await
    }

    async fn mark_all_as_stale(&self) -> StoreResult<u64> {
        let marked = self.inner.cache.mark_all_as_stale().await?;
        debug!(store_id = %self.inner.config.store_id, marked, "Marked all stale");
        Ok(marked)
    }
}
