//! Larder Core - Store Data Types
//!
//! Pure data structures shared by the cache backends and the store
//! orchestrator. This crate holds the data model, the error taxonomy and
//! configuration types - no I/O and no async runtime.

pub mod cacheable;
pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod notification;
pub mod request;
pub mod response;

pub use cacheable::Cacheable;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PersistenceConfig, ResetConfig, StoreConfig};
pub use entities::{CachedData, Timestamp, STALE_TIMESTAMP};
pub use error::{ConfigError, PersistenceError, StoreError, StoreResult};
pub use notification::NotificationEvent;
pub use request::{KeyedStoreRequest, RefreshStrategy, StoreRequest};
pub use response::{FetcherResult, StoreResponse};

/// Bounds every cache key must satisfy.
///
/// Keys are opaque to the store: they only need to be cloned into spawned
/// work, compared for equality and hashed into the in-flight and channel maps.
pub trait StoreKey: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static {}

impl<K> StoreKey for K where K: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static {}

/// Bounds every fetch error must satisfy.
///
/// Errors are shared between every subscriber of one in-flight fetch, so they
/// must be cloneable, and they take part in de-duplication of consecutive
/// responses, so they must be comparable.
pub trait StoreErrorValue: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {}

impl<E> StoreErrorValue for E where E: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {}
