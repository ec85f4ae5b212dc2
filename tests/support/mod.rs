#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use bytes::Bytes;
use folio_offline::worker::{
    CacheStorage, FetchError, FetchRequest, FetchResponse, Fetcher, Registration, WorkerConfig,
};
use tokio::sync::Semaphore;
use url::Url;

pub const ORIGIN: &str = "https://folio.test/";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN)
        .and_then(|origin| origin.join(path))
        .expect("valid test url")
}

#[derive(Clone)]
struct Route {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
}

/// Scripted upstream. URLs can be held so a fetch stays in flight until released.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    holds: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &Url, status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) {
        self.routes.lock().expect("routes").insert(
            url.to_string(),
            Route {
                status,
                content_type,
                body: body.into(),
            },
        );
    }

    pub fn serve_page(&self, path: &str, body: &'static str) {
        self.serve(&url(path), StatusCode::OK, "text/html", body);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fetches of `url` wait until [`release`](Self::release) is called.
    pub fn hold(&self, url: &Url) {
        self.holds
            .lock()
            .expect("holds")
            .insert(url.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, url: &Url) {
        if let Some(gate) = self.holds.lock().expect("holds").remove(url.as_str()) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self, url: &Url) -> usize {
        self.calls
            .lock()
            .expect("calls")
            .iter()
            .filter(|called| called.as_str() == url.as_str())
            .count()
    }
}

#[async_trait]
impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let key = request.url.to_string();
        self.calls.lock().expect("calls").push(key.clone());

        let gate = self.holds.lock().expect("holds").get(&key).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate open");
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::network(key, "offline"));
        }
        let route = self.routes.lock().expect("routes").get(&key).cloned();
        match route {
            Some(route) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(route.content_type),
                );
                Ok(FetchResponse::new(route.status, headers, route.body))
            }
            None => Err(FetchError::network(key, "connection refused")),
        }
    }
}

/// Manifest small enough to script: the shell, the home page and the offline page.
pub fn worker_config(version: &str) -> WorkerConfig {
    WorkerConfig {
        version: version.to_string(),
        precache_assets: vec![
            "./".to_string(),
            "./index.html".to_string(),
            "./offline.html".to_string(),
        ],
        ..WorkerConfig::default()
    }
}

pub fn serve_shell(network: &ScriptedNetwork) {
    network.serve_page("/", "<html>shell</html>");
    network.serve_page("/index.html", "<html>home</html>");
    network.serve_page("/offline.html", "<html>offline</html>");
}

pub fn registration(network: Arc<ScriptedNetwork>, storage: Arc<CacheStorage>) -> Arc<Registration> {
    Arc::new(Registration::new(url("/"), storage, network))
}

pub fn body_text(response: &FetchResponse) -> String {
    String::from_utf8(response.body().to_vec()).expect("utf8 body")
}
