//! Caching strategies and the dispatch table that selects one per request class.

use std::sync::Arc;

use axum::http::Method;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::background::BackgroundTasks;
use super::config::CacheRole;
use super::error::FetchError;
use super::fetcher::Fetcher;
use super::metrics::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_FETCH_TOTAL, METRIC_NETWORK_FAILURE,
    METRIC_OFFLINE_FALLBACK, METRIC_STORE_FAILED,
};
use super::namespace::CacheNamespace;
use super::request::{FetchRequest, RequestKey};
use super::response::FetchResponse;
use super::router::{RequestClass, RouteRules};
use super::store::CacheStore;
use super::trim::trim_namespace;

/// Outcome of offering a request to the worker.
#[derive(Debug, Clone)]
pub enum Interception {
    /// The worker answered the request.
    Respond(FetchResponse),
    /// The worker declined; the request goes to the network untouched.
    Passthrough,
}

/// Keys of the pages served when a navigation cannot reach the network.
#[derive(Debug, Clone)]
pub struct FallbackPages {
    pub offline: RequestKey,
    pub home: RequestKey,
}

/// Everything a strategy needs, injected by the owning worker.
#[derive(Clone)]
pub struct StrategyContext {
    pub store: CacheStore,
    pub fetcher: Arc<dyn Fetcher>,
    pub background: BackgroundTasks,
    pub rules: RouteRules,
    pub fallbacks: FallbackPages,
    pub image_max_entries: usize,
    pub runtime_max_entries: Option<usize>,
}

/// Resolve `request` with the strategy assigned to `class`.
#[instrument(skip_all, fields(class = class.as_str(), url = %request.url))]
pub async fn handle(
    class: RequestClass,
    request: FetchRequest,
    ctx: &StrategyContext,
) -> Interception {
    if class == RequestClass::NonHttp {
        return Interception::Passthrough;
    }
    counter!(METRIC_FETCH_TOTAL, "class" => class.as_str()).increment(1);

    let response = match class {
        RequestClass::NonHttp => return Interception::Passthrough,
        RequestClass::Navigation => network_first(request, ctx).await,
        RequestClass::Image => cache_first_bounded(request, ctx).await,
        RequestClass::ApiRead => stale_while_revalidate(request, ctx).await,
        RequestClass::Default => cache_then_network(request, ctx).await,
    };
    Interception::Respond(response)
}

/// Navigation: live network, then the offline page, then the home page.
async fn network_first(request: FetchRequest, ctx: &StrategyContext) -> FetchResponse {
    let error = match ctx.fetcher.fetch(&request).await {
        Ok(response) => return response,
        Err(error) => error,
    };
    network_failure(RequestClass::Navigation, &error);

    if let Some(offline) = ctx.store.match_any(&ctx.fallbacks.offline) {
        counter!(METRIC_OFFLINE_FALLBACK, "page" => "offline").increment(1);
        debug!(fallback = %ctx.fallbacks.offline, "serving offline page");
        return offline;
    }
    if let Some(home) = ctx.store.match_any(&ctx.fallbacks.home) {
        counter!(METRIC_OFFLINE_FALLBACK, "page" => "home").increment(1);
        debug!(fallback = %ctx.fallbacks.home, "offline page missing, serving home page");
        return home;
    }

    warn!(
        offline = %ctx.fallbacks.offline,
        home = %ctx.fallbacks.home,
        "navigation failed and no fallback page is cached"
    );
    FetchResponse::error()
}

/// Images: immutable by URL, so a hit never touches the network.
async fn cache_first_bounded(request: FetchRequest, ctx: &StrategyContext) -> FetchResponse {
    let images = ctx.store.namespace(CacheRole::Image);
    let key = request.key();

    if let Some(hit) = images.match_request(&key) {
        cache_hit(RequestClass::Image);
        return hit;
    }
    cache_miss(RequestClass::Image);

    match ctx.fetcher.fetch(&request).await {
        Ok(response) => {
            if response.is_ok() && store_copy(&images, key, &response) {
                spawn_trim(&ctx.background, images, ctx.image_max_entries);
            }
            response
        }
        Err(error) => {
            network_failure(RequestClass::Image, &error);
            images
                .match_request(&key)
                .unwrap_or_else(FetchResponse::error)
        }
    }
}

/// API reads: answer from cache when possible and refresh it either way.
async fn stale_while_revalidate(request: FetchRequest, ctx: &StrategyContext) -> FetchResponse {
    let api = ctx.store.namespace(CacheRole::Api);
    let key = request.key();

    let revalidation = {
        let fetcher = ctx.fetcher.clone();
        let api = api.clone();
        let request = request.clone();
        let key = key.clone();
        tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) => {
                    if response.is_ok() {
                        store_copy(&api, key, &response);
                    }
                    Some(response)
                }
                Err(error) => {
                    network_failure(RequestClass::ApiRead, &error);
                    None
                }
            }
        })
    };

    if let Some(cached) = api.match_request(&key) {
        cache_hit(RequestClass::ApiRead);
        ctx.background.spawn("revalidate-api", async move {
            let _ = revalidation.await;
        });
        return cached;
    }
    cache_miss(RequestClass::ApiRead);

    match revalidation.await {
        Ok(Some(response)) => response,
        Ok(None) => retry_fetch(&request, ctx).await,
        Err(join_error) => {
            warn!(error = %join_error, "revalidation task aborted");
            retry_fetch(&request, ctx).await
        }
    }
}

async fn retry_fetch(request: &FetchRequest, ctx: &StrategyContext) -> FetchResponse {
    match ctx.fetcher.fetch(request).await {
        Ok(response) => response,
        Err(error) => {
            network_failure(RequestClass::ApiRead, &error);
            FetchResponse::error()
        }
    }
}

/// Everything else: any cached copy, else the network, keeping same-origin GETs.
async fn cache_then_network(request: FetchRequest, ctx: &StrategyContext) -> FetchResponse {
    let key = request.key();
    if let Some(hit) = ctx.store.match_any(&key) {
        cache_hit(RequestClass::Default);
        return hit;
    }
    cache_miss(RequestClass::Default);

    let response = match ctx.fetcher.fetch(&request).await {
        Ok(response) => response,
        Err(error) => {
            network_failure(RequestClass::Default, &error);
            return FetchResponse::error();
        }
    };

    let storable = request.method == Method::GET
        && ctx.rules.is_same_origin(&request.url)
        && response.is_ok();
    if storable {
        let runtime = ctx.store.namespace(CacheRole::Runtime);
        if store_copy(&runtime, key, &response) {
            if let Some(max_entries) = ctx.runtime_max_entries {
                spawn_trim(&ctx.background, runtime, max_entries);
            }
        }
    }
    response
}

fn spawn_trim(background: &BackgroundTasks, namespace: Arc<CacheNamespace>, max_entries: usize) {
    background.spawn("trim", async move {
        trim_namespace(&namespace, max_entries);
    });
}

/// Best-effort write; a failed store never affects the response.
fn store_copy(namespace: &CacheNamespace, key: RequestKey, response: &FetchResponse) -> bool {
    match namespace.put(key, response.clone()) {
        Ok(()) => true,
        Err(error) => {
            counter!(METRIC_STORE_FAILED, "cache" => namespace.name().to_string()).increment(1);
            warn!(cache = namespace.name(), error = %error, "failed to store response copy");
            false
        }
    }
}

fn cache_hit(class: RequestClass) {
    counter!(METRIC_CACHE_HIT, "class" => class.as_str()).increment(1);
    debug!(class = class.as_str(), outcome = "hit", "serving cached response");
}

fn cache_miss(class: RequestClass) {
    counter!(METRIC_CACHE_MISS, "class" => class.as_str()).increment(1);
    debug!(class = class.as_str(), outcome = "miss", "cache miss, going to network");
}

fn network_failure(class: RequestClass, error: &FetchError) {
    counter!(METRIC_NETWORK_FAILURE, "class" => class.as_str()).increment(1);
    warn!(class = class.as_str(), error = %error, "network fetch failed");
}
