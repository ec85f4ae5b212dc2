//! The network behind the worker, backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, header};
use reqwest::Client;
use tracing::{debug, instrument};
use url::{Origin, Url};

use crate::worker::{FetchError, FetchRequest, FetchResponse, Fetcher};

use super::error::InfraError;

/// Headers that describe a single connection and never travel past a proxy.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_LENGTH,
];

/// Fetches same-origin URLs from the upstream and everything else as-is.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
    public_origin: Origin,
    upstream: Url,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    pub fn new(
        public_origin: &Url,
        upstream: Url,
        timeout: Option<Duration>,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("folio-offline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::upstream(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            public_origin: public_origin.origin(),
            upstream,
            timeout,
        })
    }

    /// Where a request for `url` is actually sent.
    pub fn target_url(&self, url: &Url) -> Url {
        if url.origin() != self.public_origin {
            return url.clone();
        }
        let mut target = self.upstream.clone();
        let prefix = self.upstream.path().trim_end_matches('/');
        target.set_path(&format!("{prefix}{}", url.path()));
        target.set_query(url.query());
        target.set_fragment(None);
        target
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let target = self.target_url(&request.url);
        let url = request.url.to_string();

        let mut builder = self
            .client
            .request(request.method.clone(), target.clone())
            .headers(strip_hop_by_hop(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| map_reqwest_error(&url, err))?;
        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(&url, err))?;

        debug!(target_url = %target, status = status.as_u16(), bytes = body.len(), "upstream responded");
        Ok(FetchResponse::new(status, headers, body))
    }
}

/// Copy `headers` without the connection-scoped ones.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in &HOP_BY_HOP {
        forwarded.remove(name);
    }
    forwarded.remove("keep-alive");
    forwarded
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_builder() {
        FetchError::InvalidRequest(err.to_string())
    } else {
        FetchError::network(url, err.to_string())
    }
}
