mod support;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use folio_offline::worker::{
    CacheStorage, Destination, FetchRequest, RequestClass, RequestKey, RouteRules, classify,
    trim_namespace,
};
use support::{ScriptedNetwork, body_text, registration, serve_shell, url, worker_config};
use url::Url;

fn image(index: usize) -> FetchRequest {
    FetchRequest::get(url(&format!("/uploads/art-{index:02}.webp"))).with_destination(Destination::Image)
}

#[tokio::test]
async fn image_cache_keeps_only_the_newest_seventy() {
    let network = ScriptedNetwork::new();
    serve_shell(&network);
    for index in 0..75 {
        network.serve(&image(index).url, StatusCode::OK, "image/webp", vec![index as u8; 16]);
    }
    let storage = Arc::new(CacheStorage::default());
    let registration = registration(network.clone(), storage.clone());
    registration.register(worker_config("v1")).await.expect("install");

    for index in 0..75 {
        let response = registration.dispatch_fetch(image(index)).await.expect("image");
        assert_eq!(response.status(), StatusCode::OK);
    }
    registration.background().settle().await;

    let images = storage.get("images-v1").expect("image cache");
    let kept: Vec<String> = images.keys().iter().map(|key| key.url().to_string()).collect();
    let expected: Vec<String> = (5..75).map(|index| image(index).url.to_string()).collect();
    assert_eq!(kept, expected);

    // A kept image is answered from cache even with the network gone.
    network.set_offline(true);
    let cached = registration.dispatch_fetch(image(74)).await.expect("cached image");
    assert_eq!(cached.body().as_ref(), &[74u8; 16]);
    assert_eq!(network.calls(&image(74).url), 1);
}

#[tokio::test]
async fn offline_navigation_serves_the_cached_fallback_pages() {
    let network = ScriptedNetwork::new();
    serve_shell(&network);
    let storage = Arc::new(CacheStorage::default());
    let registration = registration(network.clone(), storage.clone());
    registration.register(worker_config("v1")).await.expect("install");

    network.set_offline(true);
    let offline_key = RequestKey::get(&url("/offline.html"));
    let cached_offline = storage.match_any(&offline_key).expect("offline page precached");

    let response = registration
        .dispatch_fetch(FetchRequest::navigate(url("/gallery/dusk")))
        .await
        .expect("fallback");
    assert_eq!(response.body(), cached_offline.body());
    assert_eq!(response.headers(), cached_offline.headers());

    let precache = storage.get("precache-v1").expect("precache");
    assert!(precache.delete(&offline_key));

    let response = registration
        .dispatch_fetch(FetchRequest::navigate(url("/gallery/dusk")))
        .await
        .expect("home fallback");
    assert_eq!(body_text(&response), "<html>home</html>");
}

#[tokio::test]
async fn api_reads_return_cached_copy_until_revalidation_lands() {
    let network = ScriptedNetwork::new();
    serve_shell(&network);
    let artworks = url("/rest/v1/artworks?select=*&order=created_at.desc");
    network.serve(&artworks, StatusCode::OK, "application/json", r#"[{"id":1}]"#);

    let storage = Arc::new(CacheStorage::default());
    let registration = registration(network.clone(), storage.clone());
    registration.register(worker_config("v1")).await.expect("install");

    let first = registration
        .dispatch_fetch(FetchRequest::get(artworks.clone()))
        .await
        .expect("first read");
    assert_eq!(body_text(&first), r#"[{"id":1}]"#);
    registration.background().settle().await;

    network.serve(&artworks, StatusCode::OK, "application/json", r#"[{"id":1},{"id":2}]"#);
    network.hold(&artworks);

    let during = registration
        .dispatch_fetch(FetchRequest::get(artworks.clone()))
        .await
        .expect("stale read");
    assert_eq!(body_text(&during), r#"[{"id":1}]"#);
    assert_eq!(registration.background().pending(), 1);

    network.release(&artworks);
    registration.background().settle().await;

    let after = registration
        .dispatch_fetch(FetchRequest::get(artworks.clone()))
        .await
        .expect("revalidated read");
    assert_eq!(body_text(&after), r#"[{"id":1},{"id":2}]"#);
}

#[tokio::test]
async fn cross_origin_api_paths_are_not_api_reads() {
    let rules = RouteRules::new(&url("/"), "/rest/v1/artworks");
    let foreign = Url::parse("https://db.example/rest/v1/artworks?select=*").expect("url");
    let request = FetchRequest::get(foreign.clone()).with_method(Method::GET);
    assert_eq!(classify(&request, &rules), RequestClass::Default);

    let network = ScriptedNetwork::new();
    serve_shell(&network);
    network.serve(&foreign, StatusCode::OK, "application/json", "[]");
    let storage = Arc::new(CacheStorage::default());
    let registration = registration(network.clone(), storage.clone());
    registration.register(worker_config("v1")).await.expect("install");

    registration.dispatch_fetch(request).await.expect("foreign read");
    registration.background().settle().await;

    assert!(storage.get("api-artworks-v1").is_none_or(|api| api.is_empty()));
    assert!(storage.get("runtime").is_none_or(|runtime| runtime.is_empty()));
}

#[test]
fn trimming_twice_changes_nothing_the_second_time() {
    let storage = CacheStorage::default();
    let images = storage.open("images-v1");
    for index in 0..6 {
        let request = image(index);
        images
            .put(
                request.key(),
                folio_offline::worker::FetchResponse::new(
                    StatusCode::OK,
                    Default::default(),
                    vec![index as u8],
                ),
            )
            .expect("put");
    }

    assert_eq!(trim_namespace(&images, 4), 2);
    let once = images.keys();
    assert_eq!(trim_namespace(&images, 4), 0);
    assert_eq!(images.keys(), once);
    assert_eq!(once.first(), Some(&image(2).key()));
}

#[tokio::test]
async fn activating_a_new_version_only_drops_the_old_precache() {
    let network = ScriptedNetwork::new();
    serve_shell(&network);
    network.serve(&url("/style.css"), StatusCode::OK, "text/css", "body{}");
    network.serve(&image(1).url, StatusCode::OK, "image/webp", "img");

    let storage = Arc::new(CacheStorage::default());
    let registration = registration(network.clone(), storage.clone());
    registration.register(worker_config("v1")).await.expect("v1");
    registration
        .dispatch_fetch(FetchRequest::get(url("/style.css")))
        .await
        .expect("stylesheet");
    registration.dispatch_fetch(image(1)).await.expect("image");
    registration.background().settle().await;

    let v2 = registration.register(worker_config("v2")).await.expect("v2");
    assert_eq!(registration.active().map(|worker| worker.id()), Some(v2.id()));

    assert!(!storage.has("precache-v1"));
    assert!(storage.has("precache-v2"));
    assert!(
        storage
            .get("runtime")
            .expect("runtime")
            .contains(&RequestKey::get(&url("/style.css")))
    );
    assert_eq!(storage.get("images-v1").expect("images").len(), 1);
}
