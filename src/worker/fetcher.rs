//! The network as seen by the worker.

use async_trait::async_trait;

use super::error::FetchError;
use super::request::FetchRequest;
use super::response::FetchResponse;

/// Performs a live network fetch.
///
/// HTTP error statuses are responses, not errors: only a failure to obtain
/// any response at all is reported as [`FetchError`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}
