use thiserror::Error;

/// Failure modes of a single upstream HTTP call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Network error, timeout, 5xx or malformed payload. Retryable.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The upstream answered 404 for a single-item lookup. Not retryable.
    #[error("product not found upstream")]
    NotFound,

    /// The upstream rejected the API credential. Not retryable; fatal to a
    /// refresh.
    #[error("upstream rejected the API credential")]
    Auth,
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamError::Transient(_))
    }
}

/// A full-catalog fetch that yielded nothing at all. Partial failures are not
/// errors: the fetcher degrades to whatever it accumulated before the fault.
#[derive(Debug, Error)]
#[error("catalog fetch aborted after {requests} request(s) with no products")]
pub struct FetchFailed {
    pub requests: u32,
    #[source]
    pub source: UpstreamError,
}

/// Errors surfaced by the query layer to the HTTP collaborator.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The category key is not in the configured table. Validation error,
    /// checked before the cache is consulted.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// The cache is empty and there is no in-flight refresh worth waiting
    /// for. Maps to a service-unavailable response.
    #[error("catalog cache is empty and no refresh is in flight")]
    CacheUnavailable,

    #[error("product {0} not found")]
    NotFound(String),

    /// Live-lookup fallback failed for a reason other than "not found".
    #[error(transparent)]
    Upstream(UpstreamError),
}
