use std::{path::PathBuf, process, sync::Arc, time::Duration};

use folio_offline::{
    application::error::AppError,
    config::{self, InspectArgs, SkipWaitingArgs},
    infra::{
        error::InfraError,
        fetch::HttpFetcher,
        http::{self, MESSAGE_PATH, ProxyState},
        persist, telemetry,
    },
    worker::{CacheStorage, Registration, WorkerConfig},
};
use folio_offline_types::{MessageAck, NamespaceSummary, WorkerMessage};
use tokio::task::JoinHandle;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use url::Url;

const INSTALL_RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Inspect(args) => run_inspect(args),
        config::Command::SkipWaiting(args) => run_skip_waiting(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let storage = Arc::new(match settings.storage.directory.as_ref() {
        Some(directory) => persist::load(directory, settings.storage.quota_bytes)?,
        None => CacheStorage::new(settings.storage.quota_bytes),
    });

    let fetcher = Arc::new(HttpFetcher::new(
        &settings.server.public_origin,
        settings.upstream.base_url.clone(),
        settings.upstream.timeout,
    )?);
    let registration = Arc::new(Registration::new(
        settings.server.public_origin.clone(),
        storage.clone(),
        fetcher,
    ));

    let install_handle = match registration
        .resume(settings.worker.clone())
        .map_err(AppError::from)?
    {
        Some(worker) => {
            info!(worker = %worker.id(), version = worker.version(), "worker resumed from persisted caches");
            None
        }
        None => Some(spawn_install(registration.clone(), settings.worker.clone())),
    };
    let flush_handle = settings
        .storage
        .directory
        .clone()
        .map(|directory| spawn_flush(storage.clone(), directory, settings.storage.flush_interval));

    let state = ProxyState {
        registration: registration.clone(),
        public_origin: settings.server.public_origin.clone(),
        body_limit_bytes: settings.server.body_limit_bytes,
    };
    let result = serve_http(&settings, state).await;

    if let Some(handle) = install_handle {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(handle) = flush_handle {
        handle.abort();
        let _ = handle.await;
    }

    if tokio::time::timeout(
        settings.server.graceful_shutdown,
        registration.background().settle(),
    )
    .await
    .is_err()
    {
        warn!(
            pending = registration.background().pending(),
            "background cache work still running at shutdown"
        );
    }

    if let Some(directory) = settings.storage.directory.clone() {
        flush(storage, directory).await?;
    }

    result
}

/// Install the configured worker, retrying while the upstream is unreachable.
/// Requests pass straight through until a worker is active.
fn spawn_install(registration: Arc<Registration>, worker: WorkerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match registration.register(worker.clone()).await {
                Ok(installed) => {
                    info!(worker = %installed.id(), version = installed.version(), "worker registered");
                    return;
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        retry_in_secs = INSTALL_RETRY_INTERVAL.as_secs(),
                        "worker registration failed, serving without a worker"
                    );
                    tokio::time::sleep(INSTALL_RETRY_INTERVAL).await;
                }
            }
        }
    })
}

fn spawn_flush(storage: Arc<CacheStorage>, directory: PathBuf, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            if let Err(err) = flush(storage.clone(), directory.clone()).await {
                warn!(error = %err, "periodic cache snapshot failed");
            }
        }
    })
}

async fn flush(storage: Arc<CacheStorage>, directory: PathBuf) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || persist::save(&storage, &directory))
        .await
        .map_err(|err| AppError::unexpected(format!("snapshot task failed: {err}")))??;
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: ProxyState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        address = %settings.server.addr,
        public_origin = %settings.server.public_origin,
        upstream = %settings.upstream.base_url,
        version = %settings.worker.version,
        "caching proxy listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}

fn run_inspect(args: InspectArgs) -> Result<(), AppError> {
    let Some(snapshot) = persist::read(&args.directory)? else {
        return Err(AppError::validation(format!(
            "no `{}` found in {}",
            persist::SNAPSHOT_FILE,
            args.directory.display()
        )));
    };

    let summaries: Vec<NamespaceSummary> = snapshot
        .namespaces
        .iter()
        .map(|namespace| namespace.summary())
        .collect();

    let rendered = serde_json::to_string_pretty(&summaries)
        .map_err(|err| AppError::unexpected(format!("failed to render summary: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_skip_waiting(
    settings: config::Settings,
    args: SkipWaitingArgs,
) -> Result<(), AppError> {
    let base = match args.endpoint {
        Some(endpoint) => endpoint,
        None => format!("http://{}", settings.server.addr),
    };
    let url = Url::parse(&base)
        .and_then(|base| base.join(MESSAGE_PATH))
        .map_err(|err| AppError::validation(format!("invalid endpoint `{base}`: {err}")))?;

    let response = reqwest::Client::new()
        .post(url.clone())
        .json(&WorkerMessage::SkipWaiting)
        .send()
        .await
        .map_err(|err| InfraError::upstream(format!("POST {url} failed: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(InfraError::upstream(format!("POST {url} answered {status}")).into());
    }
    let ack: MessageAck = response
        .json()
        .await
        .map_err(|err| InfraError::upstream(format!("unexpected reply from {url}: {err}")))?;

    match ack.activated {
        Some(id) => println!("activated waiting worker {id}"),
        None => println!("no worker was waiting"),
    }
    Ok(())
}
