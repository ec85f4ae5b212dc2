//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::worker::WorkerConfig;

mod cli;

pub use cli::{CliArgs, Command, InspectArgs, ServeArgs, ServeOverrides, SkipWaitingArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio-offline";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_BODY_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_UPSTREAM_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub upstream: UpstreamSettings,
    pub worker: WorkerConfig,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Origin the proxied pages live on; the worker's same-origin checks use it.
    pub public_origin: Url,
    pub graceful_shutdown: Duration,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: Url,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: Option<PathBuf>,
    pub quota_bytes: Option<u64>,
    pub flush_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Inspect(_)) | Some(Command::SkipWaiting(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    upstream: RawUpstreamSettings,
    worker: RawWorkerSettings,
    storage: RawStorageSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(origin) = overrides.public_origin.as_ref() {
            self.server.public_origin = Some(origin.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.upstream_base_url.as_ref() {
            self.upstream.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.upstream_timeout_seconds {
            self.upstream.timeout_seconds = Some(seconds);
        }
        if let Some(version) = overrides.worker_version.as_ref() {
            self.worker.version = Some(version.clone());
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
        if let Some(quota) = overrides.storage_quota_bytes {
            self.storage.quota_bytes = Some(quota);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            upstream,
            worker,
            storage,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let upstream = build_upstream_settings(upstream)?;
        let worker = build_worker_config(worker)?;
        let storage = build_storage_settings(storage)?;

        Ok(Self {
            server,
            logging,
            upstream,
            worker,
            storage,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let public_origin = match server.public_origin {
        Some(origin) => parse_http_url(&origin, "server.public_origin")?,
        None => parse_http_url(&format!("http://{addr}"), "server.public_origin")?,
    };

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let body_limit = server.body_limit_bytes.unwrap_or(DEFAULT_BODY_LIMIT_BYTES);
    if body_limit == 0 {
        return Err(LoadError::invalid(
            "server.body_limit_bytes",
            "must be greater than zero",
        ));
    }
    let body_limit_bytes = usize::try_from(body_limit).map_err(|_| {
        LoadError::invalid(
            "server.body_limit_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        public_origin,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        body_limit_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let base_url = parse_http_url(
        upstream
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_UPSTREAM_BASE_URL),
        "upstream.base_url",
    )?;

    let timeout = match upstream.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "upstream.timeout_seconds",
                "must be greater than zero when set",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(UpstreamSettings { base_url, timeout })
}

fn build_worker_config(worker: RawWorkerSettings) -> Result<WorkerConfig, LoadError> {
    let defaults = WorkerConfig::default();

    let version = worker.version.unwrap_or(defaults.version);
    if version.trim().is_empty() {
        return Err(LoadError::invalid("worker.version", "must not be empty"));
    }

    let scope = worker.scope.unwrap_or(defaults.scope);
    if !scope.starts_with('/') {
        return Err(LoadError::invalid(
            "worker.scope",
            "must be an absolute path starting with `/`",
        ));
    }

    let api_path = worker.api_path.unwrap_or(defaults.api_path);
    if api_path.trim().is_empty() {
        return Err(LoadError::invalid("worker.api_path", "must not be empty"));
    }

    let image_max_entries = worker
        .image_max_entries
        .unwrap_or(defaults.image_max_entries);
    if image_max_entries == 0 {
        return Err(LoadError::invalid(
            "worker.image_max_entries",
            "must be greater than zero",
        ));
    }

    let runtime_max_entries = match worker.runtime_max_entries {
        Some(0) => {
            return Err(LoadError::invalid(
                "worker.runtime_max_entries",
                "must be greater than zero when set",
            ));
        }
        other => other,
    };

    Ok(WorkerConfig {
        version,
        scope,
        precache_assets: worker.precache_assets.unwrap_or(defaults.precache_assets),
        offline_page: worker.offline_page.unwrap_or(defaults.offline_page),
        home_page: worker.home_page.unwrap_or(defaults.home_page),
        api_path,
        image_max_entries,
        runtime_max_entries,
        skip_waiting_on_install: worker
            .skip_waiting_on_install
            .unwrap_or(defaults.skip_waiting_on_install),
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let directory = match storage.directory {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(LoadError::invalid(
                "storage.directory",
                "path must not be empty",
            ));
        }
        other => other,
    };

    if storage.quota_bytes == Some(0) {
        return Err(LoadError::invalid(
            "storage.quota_bytes",
            "must be greater than zero when set",
        ));
    }

    let flush_secs = storage
        .flush_interval_seconds
        .unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS);
    if flush_secs == 0 {
        return Err(LoadError::invalid(
            "storage.flush_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(StorageSettings {
        directory,
        quota_bytes: storage.quota_bytes,
        flush_interval: Duration::from_secs(flush_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    public_origin: Option<String>,
    body_limit_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    version: Option<String>,
    scope: Option<String>,
    precache_assets: Option<Vec<String>>,
    offline_page: Option<String>,
    home_page: Option<String>,
    api_path: Option<String>,
    image_max_entries: Option<usize>,
    runtime_max_entries: Option<usize>,
    skip_waiting_on_install: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
    quota_bytes: Option<u64>,
    flush_interval_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_http_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{other}`, expected http or https"),
        )),
    }
}
