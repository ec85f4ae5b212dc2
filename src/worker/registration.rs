//! Coordinates worker versions for one origin.

use std::sync::{Arc, RwLock};

use folio_offline_types::{MessageAck, WorkerMessage, WorkerStatus};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::background::BackgroundTasks;
use super::config::WorkerConfig;
use super::error::{FetchError, RegisterError};
use super::fetcher::Fetcher;
use super::lock::{rw_read, rw_write};
use super::lifecycle::ServiceWorker;
use super::request::FetchRequest;
use super::response::FetchResponse;
use super::storage::CacheStorage;
use super::strategy::Interception;

const SOURCE: &str = "worker::registration";

/// Holds the active and waiting workers and routes fetches to the active one.
pub struct Registration {
    origin: Url,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    background: BackgroundTasks,
    active: RwLock<Option<Arc<ServiceWorker>>>,
    waiting: RwLock<Option<Arc<ServiceWorker>>>,
}

impl Registration {
    pub fn new(origin: Url, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            origin,
            storage,
            fetcher,
            background: BackgroundTasks::new(),
            active: RwLock::new(None),
            waiting: RwLock::new(None),
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    pub fn active(&self) -> Option<Arc<ServiceWorker>> {
        rw_read(&self.active, SOURCE, "active").clone()
    }

    pub fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        rw_read(&self.waiting, SOURCE, "waiting").clone()
    }

    /// Install a new worker version.
    ///
    /// It activates right away when it signalled skip-waiting or nothing is
    /// active yet; otherwise it replaces any previously waiting worker. A
    /// failed install leaves the current workers untouched.
    #[instrument(skip_all, fields(version = %config.version))]
    pub async fn register(&self, config: WorkerConfig) -> Result<Arc<ServiceWorker>, RegisterError> {
        let worker = Arc::new(ServiceWorker::new(
            &self.origin,
            config,
            self.storage.clone(),
            self.fetcher.clone(),
            self.background.clone(),
        )?);
        worker.install().await?;

        if worker.skip_waiting_requested() || self.active().is_none() {
            self.promote(worker.clone());
        } else {
            let previous = rw_write(&self.waiting, SOURCE, "register").replace(worker.clone());
            if let Some(previous) = previous {
                previous.mark_redundant();
            }
            info!(worker = %worker.id(), "worker installed and waiting");
        }
        Ok(worker)
    }

    /// Reinstate a worker version whose precache is already complete in
    /// storage, without touching the network. Returns `None` when the
    /// version still needs a regular [`register`](Self::register).
    pub fn resume(&self, config: WorkerConfig) -> Result<Option<Arc<ServiceWorker>>, RegisterError> {
        let worker = Arc::new(ServiceWorker::new(
            &self.origin,
            config,
            self.storage.clone(),
            self.fetcher.clone(),
            self.background.clone(),
        )?);
        if !worker.resume_installed()? {
            return Ok(None);
        }
        self.promote(worker.clone());
        Ok(Some(worker))
    }

    /// Apply a message posted by a controlled page.
    pub fn post_message(&self, message: WorkerMessage) -> MessageAck {
        match message {
            WorkerMessage::SkipWaiting => {
                let waiting = rw_write(&self.waiting, SOURCE, "post_message").take();
                let activated = waiting.map(|worker| {
                    worker.skip_waiting();
                    let id = worker.id();
                    self.promote(worker);
                    id
                });
                if activated.is_none() {
                    debug!("skip-waiting received with no waiting worker");
                }
                MessageAck {
                    accepted: true,
                    activated,
                }
            }
            WorkerMessage::Unknown => {
                debug!("ignoring unknown worker message");
                MessageAck {
                    accepted: false,
                    activated: None,
                }
            }
        }
    }

    /// Route a request through the active worker, or straight to the network
    /// when there is none or it declines the request.
    pub async fn dispatch_fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let Some(worker) = self.active() else {
            return self.fetcher.fetch(&request).await;
        };
        match worker.handle_fetch(request.clone()).await {
            Interception::Respond(response) => Ok(response),
            Interception::Passthrough => self.fetcher.fetch(&request).await,
        }
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            active: self.active().map(|worker| worker.summary()),
            waiting: self.waiting().map(|worker| worker.summary()),
            namespaces: self.storage.summaries(),
        }
    }

    fn promote(&self, worker: Arc<ServiceWorker>) {
        // A promoted worker supersedes whatever was parked behind the old one.
        let parked = rw_write(&self.waiting, SOURCE, "promote").take();
        if let Some(parked) = parked.filter(|parked| parked.id() != worker.id()) {
            parked.mark_redundant();
            debug!(worker = %parked.id(), version = parked.version(), "waiting worker superseded");
        }
        worker.activate();
        let previous = rw_write(&self.active, SOURCE, "promote").replace(worker);
        if let Some(previous) = previous {
            previous.mark_redundant();
            warn!(worker = %previous.id(), version = previous.version(), "previous worker is now redundant");
        }
    }
}
