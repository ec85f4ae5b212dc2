//! Offline caching worker.
//!
//! The worker sits between the pages of one origin and the network. Every
//! request is classified once by [`router::classify`] and answered by the
//! strategy assigned to its class:
//!
//! | class      | strategy                 | namespace          |
//! |------------|--------------------------|--------------------|
//! | navigation | network first            | precache fallbacks |
//! | image      | cache first, bounded     | `images-v1`        |
//! | api read   | stale while revalidate   | `api-artworks-v1`  |
//! | default    | cache, then network      | `runtime`          |
//!
//! Versions are coordinated by [`Registration`]: a new [`ServiceWorker`]
//! precaches the application shell on install and deletes the namespaces of
//! older versions on activation.

pub mod background;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod lifecycle;
mod lock;
pub mod metrics;
pub mod namespace;
pub mod registration;
pub mod request;
pub mod response;
pub mod router;
pub mod storage;
pub mod store;
pub mod strategy;
pub mod trim;

pub use background::BackgroundTasks;
pub use config::{CacheNames, CacheRole, WorkerConfig};
pub use error::{CacheError, FetchError, InstallError, RegisterError, WorkerError};
pub use fetcher::Fetcher;
pub use lifecycle::ServiceWorker;
pub use namespace::{CacheNamespace, StorageUsage};
pub use registration::Registration;
pub use request::{Destination, FetchRequest, RequestKey, RequestMode};
pub use response::{FetchResponse, ResponseKind};
pub use router::{RequestClass, RouteRules, classify};
pub use storage::CacheStorage;
pub use store::CacheStore;
pub use strategy::{FallbackPages, Interception, StrategyContext};
pub use trim::trim_namespace;
