//! Store request kinds

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a `Cached` request decides whether to hit the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RefreshStrategy {
    /// Fetch only if the mediator considers the cached entry stale.
    #[default]
    RefreshIfStale,
    /// Always fetch, still serving the cached entry while the fetch runs.
    ForceRefresh,
    /// Fetch if stale, or if the cached entry is older than the given age.
    RefreshIfOlderThan(Duration),
}

impl RefreshStrategy {
    /// Map the boolean `force_refresh` flag onto a strategy.
    pub fn from_force_refresh(force_refresh: bool) -> Self {
        if force_refresh {
            Self::ForceRefresh
        } else {
            Self::RefreshIfStale
        }
    }

    pub fn is_force_refresh(&self) -> bool {
        matches!(self, Self::ForceRefresh)
    }
}

/// A request against a keyed store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyedStoreRequest<K> {
    /// Bypass the cache: always fetch, surface errors even if cached data exists.
    Fresh(K),
    /// Serve from the cache, fetching according to `refresh`.
    Cached { key: K, refresh: RefreshStrategy },
}

impl<K> KeyedStoreRequest<K> {
    pub fn fresh(key: K) -> Self {
        Self::Fresh(key)
    }

    pub fn cached(key: K, force_refresh: bool) -> Self {
        Self::Cached {
            key,
            refresh: RefreshStrategy::from_force_refresh(force_refresh),
        }
    }

    pub fn cached_with(key: K, refresh: RefreshStrategy) -> Self {
        Self::Cached { key, refresh }
    }

    pub fn key(&self) -> &K {
        match self {
            Self::Fresh(key) => key,
            Self::Cached { key, .. } => key,
        }
    }
}

/// A request against an unkeyed store (a store caching a single resource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreRequest {
    Fresh,
    Cached(RefreshStrategy),
}

impl StoreRequest {
    pub fn cached(force_refresh: bool) -> Self {
        Self::Cached(RefreshStrategy::from_force_refresh(force_refresh))
    }

    /// Attach the single key of an unkeyed store.
    pub fn with_key<K>(self, key: K) -> KeyedStoreRequest<K> {
        match self {
            Self::Fresh => KeyedStoreRequest::Fresh(key),
            Self::Cached(refresh) => KeyedStoreRequest::Cached { key, refresh },
        }
    }
}
