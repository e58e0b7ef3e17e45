//! Remote data source abstraction.

use std::future::Future;

use async_trait::async_trait;
use larder_core::{FetcherResult, StoreKey};

/// Single-shot fetch of the value for one key.
///
/// Implementations must capture every failure of the underlying call as
/// [`FetcherResult::Failure`]. The store never retries; timeouts and retry
/// policies belong to the implementation.
#[async_trait]
pub trait Fetcher<K, T, E>: Send + Sync
where
    K: StoreKey,
{
    async fn fetch(&self, key: &K) -> FetcherResult<E, T>;
}

/// [`Fetcher`] backed by an async closure.
#[derive(Clone)]
pub struct FnFetcher<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnFetcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

/// Wrap an async closure taking the key by value.
///
/// ```ignore
/// let fetcher = fetcher_fn(|id: u64| async move {
///     client.get_account(id).await.into()
/// });
/// ```
pub fn fetcher_fn<F>(f: F) -> FnFetcher<F> {
    FnFetcher { f }
}

#[async_trait]
impl<K, T, E, F, Fut> Fetcher<K, T, E> for FnFetcher<F>
where
    K: StoreKey,
    F: Fn(K) -> Fut + Send + Sync,
    Fut: Future<Output = FetcherResult<E, T>> + Send,
{
    async fn fetch(&self, key: &K) -> FetcherResult<E, T> {
        (self.f)(key.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_fetcher_passes_key() {
        let fetcher = fetcher_fn(|id: u32| async move {
            if id == 0 {
                FetcherResult::Failure("no such account".to_string())
            } else {
                FetcherResult::Success(id * 10)
            }
        });

        assert_eq!(fetcher.fetch(&4).await, FetcherResult::Success(40));
        assert_eq!(
            fetcher.fetch(&0).await,
            FetcherResult::Failure("no such account".to_string())
        );
    }

    #[tokio::test]
    async fn test_fn_fetcher_from_result() {
        let fetcher = fetcher_fn(|name: String| async move {
            let parsed: FetcherResult<String, u8> = name.parse::<u8>().map_err(|e| e.to_string()).into();
            parsed
        });

        assert_eq!(fetcher.fetch(&"7".to_string()).await, FetcherResult::Success(7));
        assert!(!fetcher.fetch(&"x".to_string()).await.is_success());
    }
}
