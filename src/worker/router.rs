//! Request classification.
//!
//! `classify` is pure and order-sensitive: the first matching class wins and
//! a request is never reclassified.

use axum::http::Method;
use url::{Origin, Url};

use super::request::{Destination, FetchRequest, RequestMode};

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "webp", "gif", "svg", "ico"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Not http(s); left to default handling.
    NonHttp,
    Navigation,
    Image,
    /// Same-origin GET of the REST read path.
    ApiRead,
    Default,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::NonHttp => "non_http",
            RequestClass::Navigation => "navigation",
            RequestClass::Image => "image",
            RequestClass::ApiRead => "api_read",
            RequestClass::Default => "default",
        }
    }
}

/// Inputs of classification that come from the worker rather than the request.
#[derive(Debug, Clone)]
pub struct RouteRules {
    origin: Origin,
    api_path: String,
}

impl RouteRules {
    pub fn new(worker_origin: &Url, api_path: &str) -> Self {
        Self {
            origin: worker_origin.origin(),
            api_path: api_path.to_ascii_lowercase(),
        }
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    fn is_api_read(&self, request: &FetchRequest) -> bool {
        request.method == Method::GET
            && self.is_same_origin(&request.url)
            && request
                .url
                .path()
                .to_ascii_lowercase()
                .contains(&self.api_path)
    }
}

pub fn classify(request: &FetchRequest, rules: &RouteRules) -> RequestClass {
    if !request.is_http() {
        return RequestClass::NonHttp;
    }
    if request.mode == RequestMode::Navigate {
        return RequestClass::Navigation;
    }
    if is_image_request(request) {
        return RequestClass::Image;
    }
    if rules.is_api_read(request) {
        return RequestClass::ApiRead;
    }
    RequestClass::Default
}

/// Destination metadata is not reliable everywhere, so the path extension
/// is checked as well.
fn is_image_request(request: &FetchRequest) -> bool {
    request.destination == Destination::Image || has_image_extension(request.url.path())
}

fn has_image_extension(path: &str) -> bool {
    match path.rsplit_once('.') {
        Some((_, extension)) if !extension.contains('/') => IMAGE_EXTENSIONS
            .iter()
            .any(|candidate| extension.eq_ignore_ascii_case(candidate)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(value: &str) -> Url {
        Url::parse(value).expect("valid url")
    }

    fn rules() -> RouteRules {
        RouteRules::new(&url("https://folio.test/"), "/rest/v1/artworks")
    }

    #[test]
    fn non_http_is_never_intercepted() {
        let request = FetchRequest::navigate(url("chrome-extension://abc/popup.html"));
        assert_eq!(classify(&request, &rules()), RequestClass::NonHttp);
    }

    #[test]
    fn navigation_wins_over_image_extension() {
        let request = FetchRequest::navigate(url("https://folio.test/poster.png"));
        assert_eq!(classify(&request, &rules()), RequestClass::Navigation);
    }

    #[test]
    fn image_by_destination_or_extension() {
        let by_destination = FetchRequest::get(url("https://cdn.example/render?id=4"))
            .with_destination(Destination::Image);
        let by_extension = FetchRequest::get(url("https://folio.test/art/Sunset.JPEG"));
        let svg = FetchRequest::get(url("https://folio.test/favicon.svg?v=2"));
        assert_eq!(classify(&by_destination, &rules()), RequestClass::Image);
        assert_eq!(classify(&by_extension, &rules()), RequestClass::Image);
        assert_eq!(classify(&svg, &rules()), RequestClass::Image);
    }

    #[test]
    fn extension_must_end_the_path() {
        assert!(!has_image_extension("/images.png/list"));
        assert!(!has_image_extension("/pngs"));
        assert!(!has_image_extension("/archive.tiff"));
        assert!(has_image_extension("/a/b/c.ico"));
    }

    #[test]
    fn same_origin_get_on_api_path_is_api_read() {
        let request = FetchRequest::get(url(
            "https://folio.test/rest/v1/artworks?select=*&order=created_at.desc",
        ));
        assert_eq!(classify(&request, &rules()), RequestClass::ApiRead);

        let upper = FetchRequest::get(url("https://folio.test/REST/V1/Artworks"));
        assert_eq!(classify(&upper, &rules()), RequestClass::ApiRead);
    }

    #[test]
    fn cross_origin_api_path_is_not_api_read() {
        let request = FetchRequest::get(url("https://project.supabase.co/rest/v1/artworks"));
        assert_eq!(classify(&request, &rules()), RequestClass::Default);

        let other_port = FetchRequest::get(url("https://folio.test:8443/rest/v1/artworks"));
        assert_eq!(classify(&other_port, &rules()), RequestClass::Default);
    }

    #[test]
    fn writes_to_api_path_are_default() {
        let request = FetchRequest::get(url("https://folio.test/rest/v1/artworks"))
            .with_method(Method::POST);
        assert_eq!(classify(&request, &rules()), RequestClass::Default);
    }

    #[test]
    fn everything_else_is_default() {
        let request = FetchRequest::get(url("https://folio.test/style.css"))
            .with_destination(Destination::Style);
        assert_eq!(classify(&request, &rules()), RequestClass::Default);
    }
}
