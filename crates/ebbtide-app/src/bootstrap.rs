use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ebbtide_config::{Settings, SettingsStore};
use ebbtide_core::{TorrentEngine, is_magnet_link};
use ebbtide_engine::SessionEngine;
use ebbtide_events::EventBus;
use ebbtide_ipc::{InstanceRole, RequestListener};
use ebbtide_resume::ResumeStore;
use ebbtide_telemetry::{LoggingConfig, init_logging};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine_config;
use crate::error::{AppError, AppResult};
use crate::orchestrator::TorrentOrchestrator;
use crate::reconcile;

/// Settings file name inside the configuration directory.
const SETTINGS_FILE: &str = "settings.json";

/// Directory under the configuration root holding resume artifacts.
const RESUME_DIR: &str = "resume";

/// Environment variable overriding the configuration directory.
const CONFIG_DIR_VAR: &str = "EBBTIDE_CONFIG_DIR";

/// How long shutdown waits for the session to deliver resume payloads.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Entry point for the Ebbtide boot sequence.
///
/// A second invocation forwards its request to the running instance and
/// exits; the first claims the coordination endpoint and runs the session
/// until interrupted.
///
/// # Errors
///
/// Returns an error when logging, settings, the resume store, or the
/// session cannot be initialised, or when instance coordination fails
/// partway through a handoff.
pub async fn run_app() -> AppResult<()> {
    init_logging(&LoggingConfig::default())
        .map_err(|source| AppError::telemetry("telemetry.init", source))?;

    let request = request_from_args(std::env::args());
    let socket_path = ebbtide_ipc::default_socket_path();
    match ebbtide_ipc::claim(&socket_path, &request)
        .await
        .map_err(|source| AppError::ipc("instance.claim", source))?
    {
        InstanceRole::Forwarded => {
            info!("running instance accepted the request");
            Ok(())
        }
        InstanceRole::Primary(listener) => Box::pin(run_primary(Some(listener), &request)).await,
        InstanceRole::Degraded => {
            warn!("instance coordination unavailable, continuing standalone");
            Box::pin(run_primary(None, &request)).await
        }
    }
}

async fn run_primary(listener: Option<RequestListener>, initial_request: &str) -> AppResult<()> {
    let config_dir = config_dir_from(std::env::var_os(CONFIG_DIR_VAR));
    let settings_store = SettingsStore::new(config_dir.join(SETTINGS_FILE));
    let settings = settings_store
        .load()
        .map_err(|source| AppError::config("settings.load", source))?;

    let store = ResumeStore::new(config_dir.join(RESUME_DIR));
    store
        .ensure_initialized()
        .map_err(|source| AppError::store("resume_store.init", source))?;

    let events = EventBus::new();
    let engine = Arc::new(SessionEngine::with_resume_store(
        events.clone(),
        store.clone(),
    ));
    engine
        .apply_runtime_config(engine_config::runtime_config(&settings, store.root()))
        .await
        .map_err(|source| AppError::session("engine.configure", source))?;
    info!(
        download_path = %settings.download_path.display(),
        resume_dir = %store.root().display(),
        "session configured"
    );

    let orchestrator = Arc::new(TorrentOrchestrator::new(Arc::clone(&engine), events));
    let refresh = orchestrator.spawn_event_loop();

    let summary = reconcile::reconcile_session(
        &store,
        &orchestrator,
        &settings.download_path,
        reconcile::metadata_timeout(),
    )
    .await;
    info!(
        resumed = summary.resumed.len(),
        rechecked = summary.rechecked.len(),
        fetching_metadata = summary.fetching_metadata.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "session reconciliation complete"
    );

    if !initial_request.is_empty() {
        dispatch_request(&orchestrator, initial_request).await;
    }
    let relay = listener.map(|listener| spawn_request_relay(listener, Arc::clone(&orchestrator)));

    wait_for_shutdown().await?;
    info!("shutdown requested");

    persist_on_shutdown(&engine, &store, &settings).await;

    if let Some(task) = relay {
        stop_task(task, "request_relay").await;
    }
    stop_task(refresh, "status_refresh").await;
    info!("ebbtide shutdown complete");
    Ok(())
}

/// Relay payloads accepted from later invocations into the session.
fn spawn_request_relay<E>(
    mut listener: RequestListener,
    orchestrator: Arc<TorrentOrchestrator<E>>,
) -> JoinHandle<()>
where
    E: TorrentEngine + 'static,
{
    tokio::spawn(async move {
        while let Some(request) = listener.recv().await {
            dispatch_request(&orchestrator, &request).await;
        }
    })
}

async fn dispatch_request<E>(orchestrator: &TorrentOrchestrator<E>, request: &str)
where
    E: TorrentEngine + 'static,
{
    let request = request.trim();
    if request.is_empty() {
        info!("another invocation signalled without a request");
        return;
    }
    if !is_magnet_link(request) {
        warn!("ignoring request that is not a magnet link");
        return;
    }
    match orchestrator.add_magnet(request).await {
        Ok(info_hash) => info!(info_hash = %info_hash, "forwarded request admitted"),
        Err(err) => warn!(error = %err, "forwarded request rejected"),
    }
}

/// Flush resume data for every live torrent, then record the download path
/// for the next run's stale-path check.
async fn persist_on_shutdown(engine: &SessionEngine, store: &ResumeStore, settings: &Settings) {
    match engine.persist_session(SHUTDOWN_GRACE).await {
        Ok(report) if report.is_complete() => {
            info!(
                persisted = report.persisted.len(),
                "resume snapshot complete"
            );
        }
        Ok(report) => {
            warn!(
                persisted = report.persisted.len(),
                missed = report.missed.len(),
                "resume snapshot incomplete"
            );
        }
        Err(err) => warn!(error = %err, "resume snapshot failed"),
    }
    if let Err(err) = store.write_session_marker(&settings.download_path) {
        warn!(error = %err, "failed to record the session marker");
    }
}

async fn wait_for_shutdown() -> AppResult<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::Io {
            operation: "signal.ctrl_c",
            path: None,
            source,
        })
}

async fn stop_task(task: JoinHandle<()>, name: &'static str) {
    if !task.is_finished() {
        task.abort();
    }
    let join = task.await;
    if let Err(err) = join
        && !err.is_cancelled()
    {
        warn!(task = name, error = %err, "background task join failed");
    }
}

fn config_dir_from(value: Option<OsString>) -> PathBuf {
    value.map_or_else(ebbtide_config::default_config_dir, PathBuf::from)
}

/// First command line argument, treated as an add request to forward or
/// admit locally.
fn request_from_args(mut args: impl Iterator<Item = String>) -> String {
    args.nth(1).unwrap_or_default()
}
