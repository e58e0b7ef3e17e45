//! Convenience combinators over store response streams.

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use larder_core::StoreResponse;

/// Extension methods for streams of [`StoreResponse`].
pub trait StoreResponseStreamExt<E, T>: Stream<Item = StoreResponse<E, T>> + Sized {
    /// Map the payload of every `Data` response.
    fn map_data<U, F>(self, mut f: F) -> BoxStream<'static, StoreResponse<E, U>>
    where
        Self: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        self.map(move |response| response.map(&mut f)).boxed()
    }

    /// Drop `Loading` and yield each outcome as a `Result`.
    fn data_or_error(self) -> BoxStream<'static, Result<T, E>>
    where
        Self: Send + 'static,
        E: Send + 'static,
        T: Send + 'static,
    {
        self.filter_map(|response| future::ready(response.into_outcome()))
            .boxed()
    }

    /// Resolve to the first non-`Loading` response, or `None` if the stream
    /// ends before one arrives.
    fn first_outcome(self) -> BoxFuture<'static, Option<Result<T, E>>>
    where
        Self: Send + 'static,
        E: Send + 'static,
        T: Send + 'static,
    {
        async move { self.data_or_error().next().await }.boxed()
    }
}

impl<S, E, T> StoreResponseStreamExt<E, T> for S where S: Stream<Item = StoreResponse<E, T>> + Sized {}
