use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Level, debug, event};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::worker::request::{SEC_FETCH_DEST, SEC_FETCH_MODE};

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const TARGET: &str = "folio_offline::http::response";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Reuse the caller's `x-request-id` when it is sane, otherwise mint one,
/// and echo it on the response.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Log failed exchanges. Worker-generated failures carry an [`ErrorReport`];
/// anything else is an upstream status passed through unchanged.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let mode = fetch_metadata(request.headers(), SEC_FETCH_MODE);
    let dest = fetch_metadata(request.headers(), SEC_FETCH_DEST);
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if !(status.is_client_error() || status.is_server_error()) {
        debug!(
            target: TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            request_id = %request_id,
            "request served",
        );
        return response;
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    let (source, messages) = match report {
        Some(report) => (report.source, report.messages),
        None => ("upstream", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "status passed through from upstream".to_string());

    macro_rules! failure {
        ($level:expr, $message:literal) => {
            event!(
                target: TARGET,
                $level,
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                mode = %mode,
                dest = %dest,
                elapsed_ms,
                source,
                detail = %detail,
                chain = ?messages,
                request_id = %request_id,
                $message,
            )
        };
    }

    if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
        failure!(Level::ERROR, "request failed");
    } else {
        failure!(Level::WARN, "request not served");
    }

    response
}

/// Owned, so it outlives the request handed to the next layer.
fn fetch_metadata(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string()
}
