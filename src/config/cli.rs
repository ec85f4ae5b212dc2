use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the folio-offline binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio-offline",
    version,
    about = "Offline caching proxy for the folio site"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the caching proxy.
    Serve(Box<ServeArgs>),
    /// Print the namespaces persisted in a storage directory.
    Inspect(InspectArgs),
    /// Ask a running proxy to activate its waiting worker.
    #[command(name = "skip-waiting")]
    SkipWaiting(SkipWaitingArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the origin the pages are served from.
    #[arg(long = "public-origin", value_name = "URL")]
    pub public_origin: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the upstream the proxy forwards same-origin requests to.
    #[arg(long = "upstream-base-url", value_name = "URL")]
    pub upstream_base_url: Option<String>,

    /// Apply a per-request upstream deadline.
    #[arg(long = "upstream-timeout-seconds", value_name = "SECONDS")]
    pub upstream_timeout_seconds: Option<u64>,

    /// Override the worker version tag.
    #[arg(long = "worker-version", value_name = "TAG")]
    pub worker_version: Option<String>,

    /// Persist cache namespaces in this directory.
    #[arg(long = "storage-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub storage_directory: Option<PathBuf>,

    /// Override the storage quota in bytes.
    #[arg(long = "storage-quota-bytes", value_name = "BYTES")]
    pub storage_quota_bytes: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    /// Storage directory holding `caches.json`.
    #[arg(value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub directory: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SkipWaitingArgs {
    /// Base URL of the running proxy; defaults to the configured listener.
    #[arg(long = "endpoint", value_name = "URL")]
    pub endpoint: Option<String>,
}
