#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod cli;

use agentdeck::domains::settings::{load_settings, resolve_config_path};
use agentdeck::domains::terminal::PtySupervisor;
use agentdeck::infrastructure::database::{Database, default_database_path};
use agentdeck::infrastructure::events::NamedEvent;
use agentdeck::services::SessionOrchestrator;
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, VERSION};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    cli::init_logging(args.log_level.as_deref());
    info!("agentdeck-daemon {VERSION} starting");

    let config_path = resolve_config_path(args.config.as_deref());
    let mut settings = load_settings(config_path.as_deref())?;
    cli::apply_overrides(&args, &mut settings);

    let db_path = match settings.storage.database_path.clone() {
        Some(path) => path,
        None => default_database_path()?,
    };
    info!("Using session database at {}", db_path.display());
    let db = Database::new(Some(db_path)).context("Failed to open session database")?;

    let orchestrator = Arc::new(SessionOrchestrator::from_settings(
        &settings,
        db,
        Arc::new(PtySupervisor),
    )?);

    for project in &args.projects {
        orchestrator.manager_for(Some(project));
    }

    let mut events = orchestrator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!("{} {json}", event.name()),
                    Err(e) => warn!("Failed to serialize {}: {e}", event.name()),
                },
                Err(RecvError::Lagged(skipped)) => warn!("Event log lagged by {skipped} event(s)"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let startup = orchestrator.start().await?;
    info!(
        "Ready: {} orphaned record(s) closed, {} resumed",
        startup.reconciled.len(),
        startup.resumed.len()
    );

    wait_for_shutdown_signal().await;
    info!("Shutdown requested");

    let report = orchestrator
        .shutdown(settings.daemon.shutdown_timeout())
        .await;
    if report.timed_out {
        warn!(
            "Exiting with {} session(s) still registered",
            report.remaining.len()
        );
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
