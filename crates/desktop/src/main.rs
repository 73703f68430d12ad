//! Headless desktop shell.
//!
//! Makes sure the export service is running (reusing one already on the
//! port, otherwise starting the built artifact), waits for it to answer,
//! then keeps the export job tracker alive until SIGINT or SIGTERM.
//! Image paths given on the command line are preloaded into the asset
//! store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wmark_assets::{AddOptions, ImageAssetStore, InMemoryPreviewRegistry, SelectedFile};
use wmark_client::{ClientConfig, ExportApiClient, ExportJobTracker, TrackerConfig, TrackerEvent};
use wmark_supervisor::{
    BackendSupervisor, LoadRetry, LogNotifier, SupervisorConfig, SupervisorError, SupervisorEvent,
};

mod window;

use window::HealthLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wmark_desktop=info,wmark_supervisor=info,wmark_client=info,wmark_assets=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let supervisor_config =
        SupervisorConfig::from_env().context("Invalid backend supervisor configuration")?;
    let client_config = ClientConfig::from_env().context("Invalid export client configuration")?;
    let tracker_config = TrackerConfig::from_env().context("Invalid export tracker configuration")?;
    tracing::info!(
        backend = %supervisor_config.addr(),
        artifact_dir = %supervisor_config.target_dir.display(),
        poll_interval_ms = tracker_config.poll_interval.as_millis() as u64,
        "Loaded desktop configuration",
    );

    // --- Shutdown signal ---
    // Cancelled once, by whichever signal arrives first; every teardown
    // path below funnels through it.
    let shutdown = CancellationToken::new();
    let signal_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
    };

    // --- Backend ---
    let supervisor = Arc::new(BackendSupervisor::new(supervisor_config, Arc::new(LogNotifier)));
    let supervisor_events = spawn_logger(supervisor.subscribe(), log_supervisor_event);

    let started = tokio::select! {
        result = supervisor.ensure_backend() => result,
        _ = shutdown.cancelled() => Err(SupervisorError::ShuttingDown),
    };
    match started {
        Ok(state) => tracing::info!(?state, handle = ?supervisor.handle(), "Backend available"),
        Err(SupervisorError::ShuttingDown) => {
            tracing::info!("Shutdown requested during backend startup");
            supervisor.stop_backend().await;
            supervisor_events.abort();
            return Ok(());
        }
        Err(e) => {
            tracing::error!(error = %e, title = e.title(), "Backend startup failed");
            supervisor.stop_backend().await;
            supervisor_events.abort();
            return Err(e.into());
        }
    }

    // --- Export service client ---
    let api = Arc::new(
        ExportApiClient::new(client_config.base_url.clone(), client_config.timeout)
            .context("Failed to build export service client")?,
    );

    // --- Window ---
    let window_closed = shutdown.child_token();
    let loaded = LoadRetry::default()
        .run(&HealthLoader::new(Arc::clone(&api)), &window_closed)
        .await;

    // --- Export job tracker ---
    let tracker = ExportJobTracker::new(api.clone(), tracker_config);
    let tracker_events = spawn_logger(tracker.subscribe(), log_tracker_event);

    // --- Image assets ---
    let assets = ImageAssetStore::new(Arc::new(InMemoryPreviewRegistry::new()));

    if loaded {
        match tracker.refresh().await {
            Ok(jobs) => tracing::info!(count = jobs.len(), "Loaded export jobs"),
            Err(e) => tracing::warn!(error = %e, "Failed to load export jobs"),
        }

        preload_images(&assets, std::env::args_os().skip(1).map(PathBuf::from));
        assets.wait_for_dimensions().await;
        for image in assets.images() {
            tracing::info!(
                id = %image.id,
                preview = %image.preview_url,
                dimensions = ?image.dimensions,
                "Image ready",
            );
        }

        shutdown.cancelled().await;
    }

    // --- Teardown ---
    tracing::info!("Window closed, cleaning up");

    window_closed.cancel();

    let polling = tracker.active_poll_count().await;
    tracker.dispose().await;
    tracing::info!(polling, "Export job tracker disposed");

    assets.clear();
    tracing::info!("Image previews released");

    supervisor.stop_backend().await;
    tracing::info!("Backend stopped");

    tracker_events.abort();
    supervisor_events.abort();
    signal_handle.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Read each path and add the images among them to `store`. Unreadable
/// paths are logged and skipped.
fn preload_images(store: &ImageAssetStore, paths: impl Iterator<Item = PathBuf>) {
    let mut files = Vec::new();
    for path in paths {
        match SelectedFile::read(&path) {
            Ok(file) => files.push(file),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file"),
        }
    }
    if files.is_empty() {
        return;
    }
    let added = store.add_files(files, AddOptions::default());
    tracing::info!(added = added.len(), "Preloaded images");
}

/// Forward events from `rx` to `log` until the sender goes away.
fn spawn_logger<E, F>(mut rx: broadcast::Receiver<E>, log: F) -> JoinHandle<()>
where
    E: Clone + Send + 'static,
    F: Fn(&E) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

fn log_supervisor_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::BackendCrashed { code } => {
            tracing::error!(?code, "Backend crashed");
        }
        other => tracing::info!(event = ?other, "Backend event"),
    }
}

fn log_tracker_event(event: &TrackerEvent) {
    match event {
        TrackerEvent::JobUpdated { job } => tracing::info!(
            job_id = %job.id,
            status = ?job.status,
            progress = job.progress(),
            "Export job updated",
        ),
        TrackerEvent::JobExpired { job_id } => {
            tracing::info!(%job_id, "Export job no longer known to the service");
        }
        TrackerEvent::PollFailed { job_id, error } => {
            tracing::warn!(%job_id, error, "Export job poll failed");
        }
        TrackerEvent::PollingStopped { job_id } => {
            tracing::debug!(%job_id, "Stopped polling export job");
        }
    }
}

/// Wait for a termination signal to initiate shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
