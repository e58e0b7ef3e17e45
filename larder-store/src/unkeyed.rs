//! Stores caching a single resource.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use larder_core::{StoreRequest, StoreResponse, StoreResult};

use crate::real_store::KeyedStore;

/// A store serving exactly one resource, such as the signed-in profile.
#[async_trait]
pub trait Store<T, E>: Send + Sync {
    fn stream(&self, request: StoreRequest) -> BoxStream<'static, StoreResponse<E, T>>;

    /// Make the next `Cached` request refetch.
    async fn mark_as_stale(&self) -> StoreResult<()>;
}

/// Adapts a keyed store over the unit key into a [`Store`].
#[derive(Debug)]
pub struct UnkeyedStore<S> {
    inner: S,
}

impl<S> UnkeyedStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S, T, E> Store<T, E> for UnkeyedStore<S>
where
    S: KeyedStore<(), T, E>,
{
    fn stream(&self, request: StoreRequest) -> BoxStream<'static, StoreResponse<E, T>> {
        self.inner.stream(request.with_key(()))
    }

    async fn mark_as_stale(&self) -> StoreResult<()> {
        self.inner.mark_as_stale(&()).await
    }
}
