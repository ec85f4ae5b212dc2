use axum::http::Method;
use thiserror::Error;

/// Failure to write into a cache namespace.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("requests with method `{method}` cannot be stored")]
    UnsupportedMethod { method: Method },
    #[error(
        "storing {requested} bytes in `{namespace}` would exceed the storage quota of {quota} bytes"
    )]
    QuotaExceeded {
        namespace: String,
        requested: u64,
        quota: u64,
    },
}

/// Failure of a network fetch. HTTP error statuses are not failures.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network request to `{url}` failed: {message}")]
    Network { url: String, message: String },
    #[error("network request to `{url}` exceeded its deadline")]
    Timeout { url: String },
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Failure of the install step. Nothing is committed when this is returned.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("precache asset `{asset}` cannot be resolved against the worker scope: {reason}")]
    InvalidAsset { asset: String, reason: String },
    #[error("precache asset `{url}` could not be fetched")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("precache asset `{url}` answered with status {status}")]
    BadStatus { url: String, status: u16 },
    #[error("precache commit failed")]
    Commit(#[from] CacheError),
    #[error("worker is `{state}` and cannot be installed")]
    InvalidState { state: &'static str },
}

/// A worker could not be built from its configuration.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("`{value}` cannot be resolved to a worker URL")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Failure to bring a new worker version into the registration.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Install(#[from] InstallError),
}
