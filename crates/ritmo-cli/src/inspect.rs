//! Read-only commands: init, tasks, history, check.

use std::path::PathBuf;

use chrono::Utc;

use ritmo_config::RitmoConfig;
use ritmo_ledger::{RunStore, SqliteRunStore};
use ritmo_types::ServiceKind;

/// `ritmo init`: write the starter config file.
pub fn write_initial_config(path_override: &Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = match path_override {
        Some(path) => path.clone(),
        None => ritmo_config::config_file_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    ritmo_config::save_config_to(&path, &RitmoConfig::example())?;
    println!("Wrote {}", path.display());
    println!("Tasks are disabled by default; set enabled: true and a real command to activate them.");
    Ok(())
}

/// `ritmo tasks`: list configured tasks with their next run times.
pub fn list_tasks(config_path: &Option<PathBuf>) -> anyhow::Result<()> {
    let config = crate::load_config(config_path)?;
    if config.tasks.is_empty() {
        println!("No tasks configured (run `ritmo init` for a starter config)");
        return Ok(());
    }

    let now = Utc::now();
    let mut ids: Vec<_> = config.tasks.keys().collect();
    ids.sort();

    for id in ids {
        let spec = &config.tasks[id];
        let state = if spec.enabled { "enabled" } else { "disabled" };
        println!(
            "{id:<22} {state:<9} {:<26} next {}",
            spec.rule.to_string(),
            spec.rule.next_run(now).format("%Y-%m-%d %H:%M UTC"),
        );
    }
    Ok(())
}

/// `ritmo history`: newest-first run records from the ledger.
pub async fn show_history(task: Option<String>, limit: usize) -> anyhow::Result<()> {
    let db_path = ritmo_config::ledger_db_path()?;
    if !db_path.exists() {
        println!("No run history yet ({} not found)", db_path.display());
        return Ok(());
    }

    let store = SqliteRunStore::open(&db_path)?;
    let records = store.recent(task.as_deref(), limit).await?;
    if records.is_empty() {
        println!("No matching run records");
        return Ok(());
    }

    for record in records {
        let outcome = record
            .outcome
            .map(|o| o.as_str())
            .unwrap_or("running");
        println!(
            "#{:<6} {}  {:<22} {:<8} {}",
            record.id,
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            record.task_id,
            outcome,
            record.message,
        );
    }
    Ok(())
}

/// `ritmo check`: config and credential diagnostics.
pub fn check(config_path: &Option<PathBuf>) -> anyhow::Result<()> {
    let config = crate::load_config(config_path)?;

    let enabled_tasks = config.tasks.values().filter(|t| t.enabled).count();
    println!("Config OK");
    println!("  tasks: {} ({enabled_tasks} enabled)", config.tasks.len());

    let services = &config.services;
    let rows = [
        (ServiceKind::Cleanup, services.cleanup.enabled),
        (ServiceKind::CalendarSync, services.calendar_sync.enabled),
        (ServiceKind::Enrichment, services.enrichment.enabled),
    ];
    for (kind, enabled) in rows {
        let state = if enabled { "enabled" } else { "disabled" };
        let credentials = if ritmo_config::has_credentials(kind) {
            "credentials ok"
        } else {
            "credentials missing"
        };
        println!("  service {kind}: {state}, {credentials}");
    }

    let mut recommendations = Vec::new();
    if !services.cleanup.enabled {
        recommendations.push(
            "cleanup is disabled; expired data will accumulate until it is enabled".to_string(),
        );
    }
    if services.calendar_sync.enabled && !ritmo_config::has_credentials(ServiceKind::CalendarSync) {
        recommendations.push(format!(
            "calendar_sync is enabled but {} is not set; it will fail to start",
            ritmo_config::CALENDAR_API_KEY_VAR
        ));
    }
    if services.enrichment.enabled && !ritmo_config::has_credentials(ServiceKind::Enrichment) {
        recommendations.push(format!(
            "enrichment is enabled but {} is not set; it will fail to start",
            ritmo_config::AI_API_KEY_VAR
        ));
    }

    if !recommendations.is_empty() {
        println!("Recommendations:");
        for recommendation in recommendations {
            println!("  - {recommendation}");
        }
    }
    Ok(())
}
