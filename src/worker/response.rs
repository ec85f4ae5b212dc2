//! Response snapshots produced by the network or served from a namespace.

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::application::error::ErrorReport;

/// Whether a response came back from a server or stands for a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Basic,
    Error,
}

/// A fully buffered response.
///
/// Cloning is cheap: the body is reference counted, so storing a copy in a
/// namespace while returning the original to the page never duplicates bytes.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    kind: ResponseKind,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            kind: ResponseKind::Basic,
            status,
            headers,
            body: body.into(),
        }
    }

    /// The network-error response handed to a page whose fetch could not be satisfied.
    pub fn error() -> Self {
        Self {
            kind: ResponseKind::Error,
            status: StatusCode::BAD_GATEWAY,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    /// True for server responses with a 2xx status.
    pub fn is_ok(&self) -> bool {
        self.kind == ResponseKind::Basic && self.status.is_success()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Approximate storage footprint (body plus header names and values).
    pub fn byte_size(&self) -> u64 {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        (self.body.len() + headers) as u64
    }
}

impl IntoResponse for FetchResponse {
    fn into_response(self) -> Response {
        if self.is_error() {
            let mut response = StatusCode::BAD_GATEWAY.into_response();
            ErrorReport::from_message(
                "worker::response",
                StatusCode::BAD_GATEWAY,
                "network error: no response available from cache or network",
            )
            .attach(&mut response);
            return response;
        }

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
