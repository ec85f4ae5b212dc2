//! Worker configuration.
//!
//! Controls the precache manifest, cache naming and cache bounds via the
//! `[worker]` section of `folio-offline.toml`.

const DEFAULT_VERSION: &str = "v1.0.1";
const DEFAULT_SCOPE: &str = "/";
const DEFAULT_OFFLINE_PAGE: &str = "./offline.html";
const DEFAULT_HOME_PAGE: &str = "./index.html";
const DEFAULT_API_PATH: &str = "/rest/v1/artworks";
const DEFAULT_IMAGE_MAX_ENTRIES: usize = 70;
const DEFAULT_PRECACHE_ASSETS: [&str; 11] = [
    "./",
    "./index.html",
    "./style.css",
    "./script.js",
    "./admin.html",
    "./admin.js",
    "./auth.html",
    "./auth.js",
    "./config.public.js",
    "./config.example.js",
    "./offline.html",
];

pub const PRECACHE_PREFIX: &str = "precache-";
pub const RUNTIME_CACHE: &str = "runtime";
pub const IMAGE_CACHE: &str = "images-v1";
pub const API_CACHE: &str = "api-artworks-v1";

/// Resolved `[worker]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Version tag embedded in the precache namespace name.
    pub version: String,
    /// Path the worker controls; relative assets resolve against it.
    pub scope: String,
    /// Application shell fetched at install time.
    pub precache_assets: Vec<String>,
    /// Page served when a navigation cannot reach the network.
    pub offline_page: String,
    /// Second fallback when the offline page is not cached.
    pub home_page: String,
    /// Same-origin REST read path served stale-while-revalidate.
    pub api_path: String,
    /// Maximum entries kept in the image cache.
    pub image_max_entries: usize,
    /// Optional bound for the runtime cache; unbounded when unset.
    pub runtime_max_entries: Option<usize>,
    /// Skip the waiting state as soon as install succeeds.
    pub skip_waiting_on_install: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            precache_assets: DEFAULT_PRECACHE_ASSETS
                .iter()
                .map(|asset| asset.to_string())
                .collect(),
            offline_page: DEFAULT_OFFLINE_PAGE.to_string(),
            home_page: DEFAULT_HOME_PAGE.to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            image_max_entries: DEFAULT_IMAGE_MAX_ENTRIES,
            runtime_max_entries: None,
            skip_waiting_on_install: true,
        }
    }
}

impl WorkerConfig {
    /// Namespace names for this configuration.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames {
            precache: format!("{PRECACHE_PREFIX}{}", self.version),
            runtime: RUNTIME_CACHE.to_string(),
            image: IMAGE_CACHE.to_string(),
            api: API_CACHE.to_string(),
        }
    }
}

/// One of the four fixed cache roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRole {
    Precache,
    Runtime,
    Image,
    Api,
}

impl CacheRole {
    pub const ALL: [CacheRole; 4] = [
        CacheRole::Precache,
        CacheRole::Runtime,
        CacheRole::Image,
        CacheRole::Api,
    ];
}

/// Current namespace name of every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub precache: String,
    pub runtime: String,
    pub image: String,
    pub api: String,
}

impl CacheNames {
    pub fn name(&self, role: CacheRole) -> &str {
        match role {
            CacheRole::Precache => &self.precache,
            CacheRole::Runtime => &self.runtime,
            CacheRole::Image => &self.image,
            CacheRole::Api => &self.api,
        }
    }

    /// True when `name` belongs to the current set.
    pub fn is_current(&self, name: &str) -> bool {
        CacheRole::ALL.iter().any(|role| self.name(*role) == name)
    }
}
