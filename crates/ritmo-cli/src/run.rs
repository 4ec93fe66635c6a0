//! Daemon wiring: registry, scheduler loop and service orchestration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use ritmo_ledger::{RunStore, SqliteRunStore};
use ritmo_scheduler::{CommandHandler, Executor, SchedulerLoop, TaskRegistry};
use ritmo_services::{
    ServiceOrchestrator, calendar_sync_service, cleanup_service, enrichment_service,
};

/// Run the scheduler daemon until ctrl-c.
pub async fn run_daemon(config_path: &Option<PathBuf>) -> anyhow::Result<()> {
    let config = crate::load_config(config_path)?;
    let ledger = open_ledger()?;

    // Scheduled tasks.
    let registry = Arc::new(TaskRegistry::new());
    for (id, spec) in &config.tasks {
        let handler = Arc::new(CommandHandler::new(spec.command.clone()));
        registry.register(id, spec, handler).await;
    }

    let timing = &config.scheduler;
    let executor = Arc::new(Executor::new(
        registry.clone(),
        ledger.clone(),
        Duration::from_secs(timing.cooldown_secs),
    ));
    let scheduler = Arc::new(SchedulerLoop::new(
        registry.clone(),
        executor,
        ledger.clone(),
        Duration::from_secs(timing.tick_secs),
        Duration::from_secs(timing.settle_secs),
    ));
    scheduler.start().await?;

    // Background services.
    let orchestrator = ServiceOrchestrator::new(Arc::new(ritmo_config::has_credentials));
    let services = &config.services;
    orchestrator
        .register(
            Arc::new(cleanup_service(
                &services.cleanup,
                Arc::new(CommandHandler::new(services.cleanup.command.clone())),
            )),
            services.cleanup.enabled,
        )
        .await;
    orchestrator
        .register(
            Arc::new(calendar_sync_service(
                &services.calendar_sync,
                Arc::new(CommandHandler::new(services.calendar_sync.command.clone())),
            )),
            services.calendar_sync.enabled,
        )
        .await;
    orchestrator
        .register(
            Arc::new(enrichment_service(
                &services.enrichment,
                Arc::new(CommandHandler::new(services.enrichment.command.clone())),
            )),
            services.enrichment.enabled,
        )
        .await;

    let report = orchestrator.initialize().await;
    info!(
        started = report.started.len(),
        failed = report.failed.len(),
        tasks = config.tasks.len(),
        "ritmo daemon running; press ctrl-c to stop"
    );
    for error in &report.errors {
        warn!("{error}");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("Shutting down");
    scheduler.stop().await;
    orchestrator.shutdown().await;
    Ok(())
}

/// Execute one configured task immediately, bypassing its schedule.
pub async fn run_single_task(config_path: &Option<PathBuf>, id: &str) -> anyhow::Result<()> {
    let config = crate::load_config(config_path)?;
    let Some(spec) = config.tasks.get(id) else {
        anyhow::bail!("no such task in config: {id}");
    };
    if spec.command.is_empty() {
        anyhow::bail!("task {id} has no command configured");
    }

    let ledger = open_ledger()?;
    let registry = Arc::new(TaskRegistry::new());
    registry
        .register(id, spec, Arc::new(CommandHandler::new(spec.command.clone())))
        .await;
    let executor = Executor::new(
        registry.clone(),
        ledger,
        Duration::from_secs(config.scheduler.cooldown_secs),
    );

    let outcome = executor.execute(id).await?;
    println!("{id}: {outcome}");
    if let Some(def) = registry.get(id).await {
        if let Some(message) = def.last_message {
            println!("  {message}");
        }
    }
    Ok(())
}

/// Open the durable ledger, degrading to an in-memory one when the
/// database cannot be opened.
fn open_ledger() -> anyhow::Result<Arc<dyn RunStore>> {
    match ritmo_config::ensure_config_dir() {
        Ok(_) => match ritmo_config::ledger_db_path() {
            Ok(db_path) => match SqliteRunStore::open(&db_path) {
                Ok(store) => return Ok(Arc::new(store)),
                Err(e) => warn!("Failed to open run ledger, falling back to in-memory: {e}"),
            },
            Err(e) => warn!("Failed to resolve ledger path, using in-memory ledger: {e}"),
        },
        Err(e) => warn!("Failed to resolve config dir, using in-memory ledger: {e}"),
    }
    Ok(Arc::new(SqliteRunStore::open_in_memory()?))
}
