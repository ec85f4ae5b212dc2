//! Turns proxied HTTP requests into worker fetches.

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tracing::debug;
use url::Url;

use crate::{
    application::error::HttpError,
    worker::{Destination, FetchRequest, RequestMode, request},
};

use super::ProxyState;

const SOURCE: &str = "infra::http::proxy";

/// Fallback handler: every request that is not a control endpoint goes
/// through the registration.
pub async fn proxy(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let fetch_request = match into_fetch_request(&state, request).await {
        Ok(fetch_request) => fetch_request,
        Err(err) => return err.into_response(),
    };

    match state.registration.dispatch_fetch(fetch_request).await {
        Ok(response) => response.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn into_fetch_request(
    state: &ProxyState,
    request: Request<Body>,
) -> Result<FetchRequest, HttpError> {
    let (parts, body) = request.into_parts();
    let url = request_url(&state.public_origin, &parts)?;

    let body = to_bytes(body, state.body_limit_bytes).await.map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
            &err,
        )
    })?;

    let mode = parts
        .headers
        .get(request::SEC_FETCH_MODE)
        .and_then(|value| value.to_str().ok())
        .and_then(RequestMode::from_header)
        .unwrap_or(RequestMode::NoCors);
    let destination = parts
        .headers
        .get(request::SEC_FETCH_DEST)
        .and_then(|value| value.to_str().ok())
        .map(Destination::from_header)
        .unwrap_or(Destination::Empty);

    debug!(url = %url, mode = ?mode, destination = ?destination, "proxying request");
    Ok(FetchRequest::get(url)
        .with_method(parts.method)
        .with_mode(mode)
        .with_destination(destination)
        .with_headers(parts.headers)
        .with_body(body))
}

/// Absolute-form targets keep their own origin; origin-form targets resolve
/// against the public origin.
fn request_url(public_origin: &Url, parts: &Parts) -> Result<Url, HttpError> {
    let uri = &parts.uri;
    let resolved = if uri.scheme().is_some() {
        Url::parse(&uri.to_string())
    } else {
        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        public_origin.join(target)
    };
    resolved.map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid request target",
            &err,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .uri(uri)
            .body(())
            .expect("request")
            .into_parts();
        parts
    }

    #[test]
    fn origin_form_targets_resolve_against_public_origin() {
        let origin = Url::parse("https://folio.test/").expect("origin");
        let url = request_url(&origin, &parts("/rest/v1/artworks?select=*")).expect("url");
        assert_eq!(url.as_str(), "https://folio.test/rest/v1/artworks?select=*");
    }

    #[test]
    fn absolute_form_targets_keep_their_origin() {
        let origin = Url::parse("https://folio.test/").expect("origin");
        let url = request_url(&origin, &parts("https://cdn.example/lib.js")).expect("url");
        assert_eq!(url.as_str(), "https://cdn.example/lib.js");
    }
}
