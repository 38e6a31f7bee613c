use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scenegen_core::config::env_required;
use scenegen_orchestrator::{JobEvent, Orchestrator, OrchestratorConfig};
use scenegen_worker::completion::Completion;
use scenegen_worker::manifest::load_manifest;
use scenegen_worker::WorkerError;

/// How often the board is consulted in case events were missed.
const BOARD_CHECK_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scenegen_worker=debug,scenegen_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Worker failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), WorkerError> {
    let config = OrchestratorConfig::from_env()?;
    let manifest_path = PathBuf::from(env_required("JOBS_MANIFEST")?);
    let entries = load_manifest(&manifest_path).await?;
    tracing::info!(path = %manifest_path.display(), jobs = entries.len(), "Loaded job manifest");

    let orchestrator = Orchestrator::from_config(&config)?;
    let mut events = orchestrator.subscribe();

    let mut keys = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = entry.key();
        if orchestrator.schedule(entry).await {
            keys.push(key);
        } else {
            tracing::warn!(job = %key, "Duplicate manifest entry skipped");
        }
    }

    let mut completion = Completion::new(keys, config.asset_store.is_some());
    let mut board_check = tokio::time::interval(BOARD_CHECK_INTERVAL);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    while !completion.is_done() {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    log_event(&event);
                    completion.observe(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job events lagged, catching up from the board");
                }
                Err(RecvError::Closed) => break,
            },
            _ = board_check.tick() => {
                for key in completion.pending_keys() {
                    let state = orchestrator.state(&key).await;
                    completion.reconcile(&key, state.as_ref());
                }
                tracing::debug!(remaining = completion.remaining(), "Waiting for jobs");
            }
            _ = &mut interrupt => {
                tracing::info!(remaining = completion.remaining(), "Received SIGINT (Ctrl-C), stopping");
                break;
            }
        }
    }

    orchestrator.shutdown().await;

    let summary = completion.summary();
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        persisted = summary.persisted,
        persist_failed = summary.persist_failed,
        unfinished = completion.remaining(),
        "Worker finished",
    );
    Ok(())
}

fn log_event(event: &JobEvent) {
    match event {
        JobEvent::StatusChanged {
            key,
            status,
            error: Some(error),
            ..
        } => tracing::warn!(job = %key, %status, %error, "Job status changed"),
        JobEvent::StatusChanged { key, status, .. } => {
            tracing::info!(job = %key, %status, "Job status changed");
        }
        JobEvent::AssetPersisted { key, asset, .. } => tracing::info!(
            job = %key,
            asset_id = asset.asset_id,
            version = asset.version,
            "Asset stored",
        ),
        JobEvent::PersistFailed { key, error, .. } => {
            tracing::warn!(job = %key, %error, "Asset store rejected artifact");
        }
    }
}
