//! Intercepted request metadata and the cache key derived from it.

use std::fmt;

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use url::Url;

pub const SEC_FETCH_MODE: &str = "sec-fetch-mode";
pub const SEC_FETCH_DEST: &str = "sec-fetch-dest";

/// Request mode as reported by the browser (`Sec-Fetch-Mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
    WebSocket,
}

impl RequestMode {
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "no-cors" => Some(Self::NoCors),
            "cors" => Some(Self::Cors),
            "websocket" => Some(Self::WebSocket),
            _ => None,
        }
    }
}

/// Declared destination of the request (`Sec-Fetch-Dest`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Empty,
    Document,
    Image,
    Script,
    Style,
    Font,
    Other(String),
}

impl Destination {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "empty" => Self::Empty,
            "document" => Self::Document,
            "image" => Self::Image,
            "script" => Self::Script,
            "style" => Self::Style,
            "font" => Self::Font,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A request as seen by the worker.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchRequest {
    /// A plain `GET` issued by page script (`cors` mode, empty destination).
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Cors,
            destination: Destination::Empty,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A top-level document navigation.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), &self.url)
    }
}

/// Normalised request identity used to key cache entries.
///
/// Two requests match when their method and URL agree; the fragment never
/// takes part in matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: String,
}

impl RequestKey {
    pub fn new(method: Method, url: &Url) -> Self {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        Self {
            method,
            url: normalized.into(),
        }
    }

    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
