//! Interval-driven services around injected task handlers.
//!
//! Every service has the same machinery — an interval loop that invokes an
//! opaque handler with the service's configured toggles — so one
//! [`IntervalService`] implements all three, constructed per service kind
//! from its config section.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ritmo_config::{CalendarSyncConfig, CleanupConfig, EnrichmentConfig};
use ritmo_scheduler::TaskHandler;
use ritmo_types::{ServiceKind, ServiceStatus, TaskContext};

use crate::service::BackgroundService;

/// A background service that runs a task handler on a fixed interval.
///
/// The first pass happens one interval after start. A failing pass is
/// logged and the loop keeps going.
pub struct IntervalService {
    kind: ServiceKind,
    interval: Duration,
    settings: serde_json::Value,
    handler: Arc<dyn TaskHandler>,
    state: Mutex<WorkerState>,
}

struct WorkerState {
    status: ServiceStatus,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl IntervalService {
    pub fn new(
        kind: ServiceKind,
        interval: Duration,
        settings: serde_json::Value,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            kind,
            interval,
            settings,
            handler,
            state: Mutex::new(WorkerState {
                status: ServiceStatus::Stopped,
                cancel: None,
                handle: None,
            }),
        }
    }
}

#[async_trait::async_trait]
impl BackgroundService for IntervalService {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    async fn start(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.status == ServiceStatus::Running {
            bail!("{} service is already running", self.kind);
        }

        state.status = ServiceStatus::Starting;

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let kind = self.kind;
        let interval = self.interval;
        let handler = self.handler.clone();
        let settings = self.settings.clone();

        let handle = tokio::spawn(async move {
            run_interval_loop(kind, interval, handler, settings, cancel_child).await;
        });

        state.cancel = Some(cancel);
        state.handle = Some(handle);
        state.status = ServiceStatus::Running;

        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;

        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }

        if let Some(handle) = state.handle.take() {
            let _ = handle.await;
        }

        state.status = ServiceStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        match self.state.try_lock() {
            Ok(state) => state.status.clone(),
            Err(_) => ServiceStatus::Starting,
        }
    }
}

/// Run the handler every `interval` until cancelled.
async fn run_interval_loop(
    kind: ServiceKind,
    interval: Duration,
    handler: Arc<dyn TaskHandler>,
    settings: serde_json::Value,
    cancel: CancellationToken,
) {
    info!(service = %kind, interval_secs = interval.as_secs(), "Service loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let ctx = TaskContext {
            task_id: format!("service:{kind}"),
            fired_at: chrono::Utc::now(),
            settings: settings.clone(),
        };

        match handler.run(ctx).await {
            Ok(result) if result.success => {
                info!(service = %kind, "Service pass completed: {}", result.message);
            }
            Ok(result) => {
                let reason = result.error.unwrap_or(result.message);
                warn!(service = %kind, "Service pass failed: {reason}");
            }
            Err(e) => {
                warn!(service = %kind, "Service pass failed: {e:#}");
            }
        }
    }

    info!(service = %kind, "Service loop stopped");
}

/// Expired-data cleanup. The only service that needs no credentials.
pub fn cleanup_service(config: &CleanupConfig, handler: Arc<dyn TaskHandler>) -> IntervalService {
    IntervalService::new(
        ServiceKind::Cleanup,
        Duration::from_secs(config.interval_hours * 3600),
        json!({ "archive_expired_events": config.archive_expired_events }),
        handler,
    )
}

/// External calendar sync. Credential-gated by the orchestrator.
pub fn calendar_sync_service(
    config: &CalendarSyncConfig,
    handler: Arc<dyn TaskHandler>,
) -> IntervalService {
    IntervalService::new(
        ServiceKind::CalendarSync,
        Duration::from_secs(config.interval_hours * 3600),
        json!({ "auto_create_events": config.auto_create_events }),
        handler,
    )
}

/// AI enrichment. Credential-gated by the orchestrator.
pub fn enrichment_service(
    config: &EnrichmentConfig,
    handler: Arc<dyn TaskHandler>,
) -> IntervalService {
    IntervalService::new(
        ServiceKind::Enrichment,
        Duration::from_secs(config.interval_hours * 3600),
        json!({
            "auto_categorize": config.auto_categorize,
            "auto_extract_metadata": config.auto_extract_metadata,
        }),
        handler,
    )
}
