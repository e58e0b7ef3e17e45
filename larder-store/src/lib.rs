//! Larder Store - Reactive Cache-Then-Network Stores
//!
//! Orchestrates a [`Fetcher`] (remote source), a [`Cache`] (durable local
//! snapshots with live reads) and a [`Mediator`] (freshness policy) into
//! per-key streams of [`StoreResponse`]s.
//!
//! The cache is the single source of truth: fetched values are written to it
//! and subscribers observe them through their live cache read. Concurrent
//! requests for a key share one in-flight fetch.
//!
//! # Example
//!
//! ```ignore
//! let store = RealStore::builder(config, Arc::new(fetcher), Arc::new(InMemoryCache::new()))
//!     .notifications(&hub)
//!     .build()?;
//!
//! let balance = store
//!     .stream(KeyedStoreRequest::cached(account_id, false))
//!     .first_outcome()
//!     .await;
//! ```

pub mod ext;
pub mod fetcher;
pub mod mediator;
pub mod notifications;
pub mod real_store;
pub mod single_flight;
pub mod unkeyed;

pub use ext::StoreResponseStreamExt;
pub use fetcher::{fetcher_fn, Fetcher, FnFetcher};
pub use mediator::{FreshnessMediator, Mediator};
pub use notifications::{NotificationHub, ResetListener, DEFAULT_HUB_CAPACITY};
pub use real_store::{KeyedStore, RealStore, StoreBuilder};
pub use single_flight::{FetchOutcome, SingleFlight};
pub use unkeyed::{Store, UnkeyedStore};

// Re-export the data model and persisters so most callers need one import.
pub use larder_core::{
    CachedData, Cacheable, Clock, FetcherResult, KeyedStoreRequest, ManualClock, NotificationEvent,
    RefreshStrategy, ResetConfig, StoreConfig, StoreError, StoreRequest, StoreResponse,
    StoreResult, SystemClock,
};
pub use larder_storage::{Cache, CacheStats, InMemoryCache, LmdbCache, LmdbEnvironment};
