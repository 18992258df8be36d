mod config;
mod model;
mod routeros;
mod routes;
mod services;
mod source;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::{Config, Tunables};
use routeros::{RouterOsAssociationSource, RouterOsLeaseSource};
use services::directory::DeviceDirectory;
use services::dispatch::{EventDispatcher, spawn_dispatcher_task};
use services::leases::{LeaseCache, spawn_lease_refresh_task};
use services::poller::{AssociationPoller, spawn_poller_task};
use services::reconcile::Reconciler;
use services::snapshot::SnapshotPublisher;
use services::webhook::{HttpNotifier, NotificationError};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("webhook client: {0}")]
    Notifier(#[from] NotificationError),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("server failed: {0}")]
    Serve(std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "capwatch", about = "Wireless client presence tracker for RouterOS controllers")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, env = "CAPWATCH_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Listen address, overrides `http.listen`.
    #[arg(long, env = "CAPWATCH_LISTEN")]
    listen: Option<String>,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

async fn run(cli: Cli, config: Config) -> Result<(), StartupError> {
    let tunables = Tunables::from_env();
    let cancel = CancellationToken::new();

    let directory = Arc::new(DeviceDirectory::from_config(&config.devices));
    let leases = Arc::new(LeaseCache::new());
    let snapshot = Arc::new(SnapshotPublisher::new());
    let notifier = Arc::new(HttpNotifier::new(tunables.notify_timeout)?);
    tracing::info!(devices = directory.len(), mode = ?config.router.mode, "configuration loaded");
    if directory.is_empty() {
        tracing::warn!("no devices configured; notifications disabled");
    }

    let addr = cli.listen.unwrap_or_else(|| config.http.listen.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind { addr: addr.clone(), source })?;

    let lease_task = spawn_lease_refresh_task(
        leases.clone(),
        Arc::new(RouterOsLeaseSource::new(&config.dhcp)),
        config.lease_interval(),
        cancel.clone(),
    );

    let (event_tx, event_rx) = tokio::sync::mpsc::channel(tunables.event_queue_capacity);
    let dispatch_task = spawn_dispatcher_task(EventDispatcher::new(directory.clone(), notifier), event_rx);

    let reconciler = Reconciler::new(leases.clone(), directory, snapshot.clone(), event_tx);
    let poller = AssociationPoller::new(
        RouterOsAssociationSource::new(&config.router),
        reconciler,
        config.poll_interval(),
    );
    let poll_task = spawn_poller_task(poller, cancel.clone());

    let app = routes::app(state::AppState::new(snapshot, leases), &config.http.root);

    tracing::info!(%addr, root = %config.http.root.display(), "capwatch listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(StartupError::Serve);

    cancel.cancel();
    // The poller owns the only event sender; the dispatcher drains and exits after it.
    if let Err(e) = poll_task.await {
        tracing::error!(error = %e, "poller task failed");
    }
    if let Err(e) = dispatch_task.await {
        tracing::error!(error = %e, "dispatcher task failed");
    }
    if let Err(e) = lease_task.await {
        tracing::error!(error = %e, "lease refresh task failed");
    }
    tracing::info!("capwatch stopped");
    served
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("capwatch: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log.level);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "capwatch failed");
            ExitCode::FAILURE
        }
    }
}
