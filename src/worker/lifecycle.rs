//! One worker version and its lifecycle.
//!
//! A worker is created `installing`. A successful [`ServiceWorker::install`]
//! parks it as `waiting`; [`ServiceWorker::activate`] makes it `active`.
//! Failed installs and replaced workers end `redundant`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use folio_offline_types::{LifecycleState, WorkerSummary};
use futures::future::try_join_all;
use metrics::histogram;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::background::BackgroundTasks;
use super::config::{CacheRole, WorkerConfig};
use super::error::{InstallError, WorkerError};
use super::fetcher::Fetcher;
use super::lock::{rw_read, rw_write};
use super::metrics::METRIC_INSTALL_MS;
use super::request::{FetchRequest, RequestKey};
use super::response::FetchResponse;
use super::router::{RouteRules, classify};
use super::storage::CacheStorage;
use super::store::CacheStore;
use super::strategy::{self, FallbackPages, Interception, StrategyContext};

const SOURCE: &str = "worker::lifecycle";

pub struct ServiceWorker {
    id: Uuid,
    config: Arc<WorkerConfig>,
    scope_url: Url,
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
    activated_at: RwLock<Option<OffsetDateTime>>,
    context: StrategyContext,
}

impl ServiceWorker {
    /// Build a worker for `origin`. Nothing is fetched until [`install`](Self::install).
    pub fn new(
        origin: &Url,
        config: WorkerConfig,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        background: BackgroundTasks,
    ) -> Result<Self, WorkerError> {
        let scope_url = resolve(origin, &config.scope)?;
        let fallbacks = FallbackPages {
            offline: RequestKey::get(&resolve(&scope_url, &config.offline_page)?),
            home: RequestKey::get(&resolve(&scope_url, &config.home_page)?),
        };
        let context = StrategyContext {
            store: CacheStore::new(storage, config.cache_names()),
            fetcher,
            background,
            rules: RouteRules::new(origin, &config.api_path),
            fallbacks,
            image_max_entries: config.image_max_entries,
            runtime_max_entries: config.runtime_max_entries,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            config: Arc::new(config),
            scope_url,
            state: RwLock::new(LifecycleState::Installing),
            skip_waiting: AtomicBool::new(false),
            activated_at: RwLock::new(None),
            context,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn scope_url(&self) -> &Url {
        &self.scope_url
    }

    pub fn state(&self) -> LifecycleState {
        *rw_read(&self.state, SOURCE, "state")
    }

    pub fn store(&self) -> &CacheStore {
        &self.context.store
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.context.background
    }

    /// Fetch the whole precache manifest and commit it in one step.
    ///
    /// Any fetch failure or non-2xx answer fails the install and leaves the
    /// precache namespace untouched; the worker becomes redundant.
    #[instrument(skip_all, fields(worker = %self.id, version = %self.config.version))]
    pub async fn install(&self) -> Result<(), InstallError> {
        let state = self.state();
        if state != LifecycleState::Installing {
            return Err(InstallError::InvalidState {
                state: state.as_str(),
            });
        }

        let started = Instant::now();
        let result = self.fetch_and_commit().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(count) => {
                histogram!(METRIC_INSTALL_MS, "outcome" => "installed").record(elapsed_ms);
                self.set_state(LifecycleState::Waiting);
                if self.config.skip_waiting_on_install {
                    self.skip_waiting();
                }
                info!(assets = count, elapsed_ms, "worker installed");
                Ok(())
            }
            Err(err) => {
                histogram!(METRIC_INSTALL_MS, "outcome" => "failed").record(elapsed_ms);
                self.set_state(LifecycleState::Redundant);
                warn!(error = %err, "worker install failed");
                Err(err)
            }
        }
    }

    async fn fetch_and_commit(&self) -> Result<usize, InstallError> {
        let urls = self
            .config
            .precache_assets
            .iter()
            .map(|asset| {
                self.scope_url
                    .join(asset)
                    .map_err(|err| InstallError::InvalidAsset {
                        asset: asset.clone(),
                        reason: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fetches = urls.into_iter().map(|url| {
            let fetcher = self.context.fetcher.clone();
            async move {
                let request = FetchRequest::get(url);
                let response = fetcher.fetch(&request).await.map_err(|source| {
                    InstallError::Fetch {
                        url: request.url.to_string(),
                        source,
                    }
                })?;
                if !response.is_ok() {
                    return Err(InstallError::BadStatus {
                        url: request.url.to_string(),
                        status: response.status().as_u16(),
                    });
                }
                Ok((request.key(), response))
            }
        });
        let fetched = try_join_all(fetches).await?;

        self.commit(fetched)
    }

    fn commit(&self, fetched: Vec<(RequestKey, FetchResponse)>) -> Result<usize, InstallError> {
        let precache = self.context.store.namespace(CacheRole::Precache);
        let mut added = Vec::with_capacity(fetched.len());

        for (key, response) in fetched {
            let existed = precache.contains(&key);
            if let Err(err) = precache.put(key.clone(), response) {
                for key in &added {
                    precache.delete(key);
                }
                return Err(err.into());
            }
            if !existed {
                added.push(key);
            }
        }
        Ok(precache.len())
    }

    /// Treat a precache that survived a restart as this worker's install.
    ///
    /// Succeeds only when every manifest asset is already stored under this
    /// version's precache name; the worker then moves to `waiting`.
    pub fn resume_installed(&self) -> Result<bool, InstallError> {
        let state = self.state();
        if state != LifecycleState::Installing {
            return Err(InstallError::InvalidState {
                state: state.as_str(),
            });
        }

        let names = self.context.store.names();
        let Some(precache) = self.context.store.storage().get(&names.precache) else {
            return Ok(false);
        };
        for asset in &self.config.precache_assets {
            let url = self
                .scope_url
                .join(asset)
                .map_err(|err| InstallError::InvalidAsset {
                    asset: asset.clone(),
                    reason: err.to_string(),
                })?;
            if !precache.contains(&RequestKey::get(&url)) {
                return Ok(false);
            }
        }

        self.set_state(LifecycleState::Waiting);
        info!(assets = precache.len(), "resumed worker from persisted precache");
        Ok(true)
    }

    /// Ask to be activated without waiting for the current worker to go away.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Delete every namespace outside the current name set and take control.
    /// Returns the deleted namespace names.
    #[instrument(skip_all, fields(worker = %self.id, version = %self.config.version))]
    pub fn activate(&self) -> Vec<String> {
        let deleted = self.context.store.delete_stale();
        for name in &deleted {
            info!(cache = %name, "deleted stale cache namespace");
        }

        self.set_state(LifecycleState::Active);
        *rw_write(&self.activated_at, SOURCE, "activate") = Some(OffsetDateTime::now_utc());
        info!(deleted = deleted.len(), "worker activated and claimed clients");
        deleted
    }

    pub fn mark_redundant(&self) {
        self.set_state(LifecycleState::Redundant);
    }

    /// Offer a request to this worker. Only an active worker intercepts.
    pub async fn handle_fetch(&self, request: FetchRequest) -> Interception {
        if self.state() != LifecycleState::Active {
            return Interception::Passthrough;
        }
        let class = classify(&request, &self.context.rules);
        strategy::handle(class, request, &self.context).await
    }

    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            id: self.id,
            version: self.config.version.clone(),
            state: self.state(),
            activated_at: *rw_read(&self.activated_at, SOURCE, "summary"),
        }
    }

    fn set_state(&self, next: LifecycleState) {
        *rw_write(&self.state, SOURCE, "set_state") = next;
    }
}

fn resolve(base: &Url, value: &str) -> Result<Url, WorkerError> {
    base.join(value).map_err(|source| WorkerError::InvalidUrl {
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::worker::fetcher::fake::FakeNetwork;

    const ORIGIN: &str = "https://folio.test/";

    fn origin() -> Url {
        Url::parse(ORIGIN).expect("origin")
    }

    fn config(version: &str, assets: &[&str]) -> WorkerConfig {
        WorkerConfig {
            version: version.to_string(),
            precache_assets: assets.iter().map(|asset| asset.to_string()).collect(),
            ..WorkerConfig::default()
        }
    }

    fn worker(config: WorkerConfig, storage: Arc<CacheStorage>, network: Arc<FakeNetwork>) -> ServiceWorker {
        ServiceWorker::new(&origin(), config, storage, network, BackgroundTasks::new())
            .expect("worker")
    }

    #[tokio::test]
    async fn install_commits_every_asset() {
        let network = Arc::new(FakeNetwork::default());
        network.serve("https://folio.test/", StatusCode::OK, "shell");
        network.serve("https://folio.test/offline.html", StatusCode::OK, "offline");
        let storage = Arc::new(CacheStorage::default());
        let worker = worker(config("v1", &["./", "./offline.html"]), storage.clone(), network);

        worker.install().await.expect("install");

        assert_eq!(worker.state(), LifecycleState::Waiting);
        assert!(worker.skip_waiting_requested());
        let precache = storage.get("precache-v1").expect("precache namespace");
        assert_eq!(precache.len(), 2);
    }

    #[tokio::test]
    async fn install_is_all_or_nothing() {
        let network = Arc::new(FakeNetwork::default());
        network.serve("https://folio.test/", StatusCode::OK, "shell");
        network.serve("https://folio.test/style.css", StatusCode::NOT_FOUND, "");
        let storage = Arc::new(CacheStorage::default());
        let worker = worker(config("v1", &["./", "./style.css"]), storage.clone(), network);

        let err = worker.install().await.expect_err("bad status fails install");
        assert!(matches!(err, InstallError::BadStatus { status: 404, .. }));
        assert_eq!(worker.state(), LifecycleState::Redundant);
        assert!(
            storage
                .get("precache-v1")
                .is_none_or(|namespace| namespace.is_empty())
        );
    }

    #[tokio::test]
    async fn install_twice_is_rejected() {
        let network = Arc::new(FakeNetwork::default());
        let worker = worker(config("v1", &[]), Arc::new(CacheStorage::default()), network);
        worker.install().await.expect("empty manifest installs");

        let err = worker.install().await.expect_err("already installed");
        assert!(matches!(err, InstallError::InvalidState { state: "waiting" }));
    }

    #[tokio::test]
    async fn inactive_worker_passes_requests_through() {
        let network = Arc::new(FakeNetwork::default());
        let worker = worker(config("v1", &[]), Arc::new(CacheStorage::default()), network);
        let outcome = worker
            .handle_fetch(FetchRequest::navigate(origin()))
            .await;
        assert!(matches!(outcome, Interception::Passthrough));
    }

    #[tokio::test]
    async fn resume_requires_a_complete_precache() {
        let storage = Arc::new(CacheStorage::default());
        let network = Arc::new(FakeNetwork::default());
        network.set_offline(true);

        let partial = worker(config("v1", &["./", "./offline.html"]), storage.clone(), network.clone());
        storage
            .open("precache-v1")
            .put(
                RequestKey::get(&origin()),
                FetchResponse::new(StatusCode::OK, axum::http::HeaderMap::new(), "shell"),
            )
            .expect("put");
        assert!(!partial.resume_installed().expect("resume check"));
        assert_eq!(partial.state(), LifecycleState::Installing);

        let complete = worker(config("v1", &["./"]), storage, network.clone());
        assert!(complete.resume_installed().expect("resume"));
        assert_eq!(complete.state(), LifecycleState::Waiting);
        assert_eq!(network.calls(ORIGIN), 0);
    }

    #[tokio::test]
    async fn activate_removes_only_stale_namespaces() {
        let storage = Arc::new(CacheStorage::default());
        for name in ["precache-v1", "runtime", "images-v1", "api-artworks-v1", "legacy"] {
            storage.open(name);
        }
        let network = Arc::new(FakeNetwork::default());
        let worker = worker(config("v2", &[]), storage.clone(), network);
        worker.install().await.expect("install");

        let mut deleted = worker.activate();
        deleted.sort();

        assert_eq!(deleted, vec!["legacy".to_string(), "precache-v1".to_string()]);
        assert_eq!(worker.state(), LifecycleState::Active);
        assert!(worker.summary().activated_at.is_some());
        for name in ["runtime", "images-v1", "api-artworks-v1"] {
            assert!(storage.has(name), "{name} should survive activation");
        }
    }
}
