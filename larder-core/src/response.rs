//! Tagged results flowing out of fetchers and stores

/// A state observed on a store stream.
///
/// Drives downstream UI state machines: `Loading` while a fetch triggered by
/// this subscription is outstanding, `Data` for every snapshot the cache (or a
/// fresh fetch) delivers, `Error` once per failed fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreResponse<E, T> {
    Loading,
    Data(T),
    Error(E),
}

impl<E, T> StoreResponse<E, T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Borrow the payload of a `Data` response.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Borrow the error of an `Error` response.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> StoreResponse<E, U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Loading => StoreResponse::Loading,
            Self::Data(data) => StoreResponse::Data(f(data)),
            Self::Error(error) => StoreResponse::Error(error),
        }
    }

    pub fn map_error<E2, F>(self, f: F) -> StoreResponse<E2, T>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::Loading => StoreResponse::Loading,
            Self::Data(data) => StoreResponse::Data(data),
            Self::Error(error) => StoreResponse::Error(f(error)),
        }
    }

    /// Resolve to a `Result`, or `None` while still loading.
    pub fn into_outcome(self) -> Option<Result<T, E>> {
        match self {
            Self::Loading => None,
            Self::Data(data) => Some(Ok(data)),
            Self::Error(error) => Some(Err(error)),
        }
    }
}

/// Result of a single fetch attempt.
///
/// Fetchers must capture every failure of the underlying call as `Failure`;
/// nothing may escape past this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetcherResult<E, T> {
    Success(T),
    Failure(E),
}

impl<E, T> FetcherResult<E, T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn map<U, F>(self, f: F) -> FetcherResult<E, U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => FetcherResult::Success(f(value)),
            Self::Failure(error) => FetcherResult::Failure(error),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

impl<E, T> From<Result<T, E>> for FetcherResult<E, T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_map_keeps_state() {
        let loading: StoreResponse<String, i32> = StoreResponse::Loading;
        assert_eq!(loading.map(|v| v * 2), StoreResponse::Loading);

        let data: StoreResponse<String, i32> = StoreResponse::Data(21);
        assert_eq!(data.map(|v| v * 2), StoreResponse::Data(42));

        let error: StoreResponse<String, i32> = StoreResponse::Error("boom".into());
        assert_eq!(
            error.map(|v| v * 2),
            StoreResponse::Error("boom".to_string())
        );
    }

    #[test]
    fn test_response_into_outcome() {
        assert_eq!(StoreResponse::<&str, u8>::Loading.into_outcome(), None);
        assert_eq!(StoreResponse::<&str, u8>::Data(1).into_outcome(), Some(Ok(1)));
        assert_eq!(
            StoreResponse::<&str, u8>::Error("e").into_outcome(),
            Some(Err("e"))
        );
    }

    #[test]
    fn test_response_accessors() {
        let data: StoreResponse<(), &str> = StoreResponse::Data("x");
        assert!(data.is_data());
        assert_eq!(data.data(), Some(&"x"));
        assert_eq!(data.error(), None);

        let error: StoreResponse<u8, ()> = StoreResponse::Error(3);
        assert!(error.is_error());
        assert_eq!(error.error(), Some(&3));
        assert_eq!(error.map_error(|e| e + 1), StoreResponse::Error(4));
    }

    #[test]
    fn test_fetcher_result_from_result() {
        let ok: FetcherResult<String, u32> = Ok::<u32, String>(5).into();
        assert!(ok.is_success());
        assert_eq!(ok.map(|v| v + 1).into_result(), Ok(6));

        let err: FetcherResult<String, u32> = Err::<u32, String>("timeout".into()).into();
        assert!(!err.is_success());
        assert_eq!(err.into_result(), Err("timeout".to_string()));
    }
}
