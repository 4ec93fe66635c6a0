//! Execution engine: runs one task handler with full bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use ritmo_ledger::RunStore;
use ritmo_types::{Outcome, TaskContext, TaskResult};

use crate::SchedulerError;
use crate::registry::TaskRegistry;

/// Runs task handlers and records their outcomes.
///
/// Non-overlap per task is enforced through the registry's Running guard;
/// after a run the status stays Completed/Failed for the cool-down window
/// and then reverts to Idle.
pub struct Executor {
    registry: Arc<TaskRegistry>,
    ledger: Arc<dyn RunStore>,
    cooldown: Duration,
}

impl Executor {
    pub fn new(registry: Arc<TaskRegistry>, ledger: Arc<dyn RunStore>, cooldown: Duration) -> Self {
        Self {
            registry,
            ledger,
            cooldown,
        }
    }

    /// Execute one task now.
    ///
    /// Fails fast with `AlreadyRunning` when a prior execution has not
    /// finished — the rejected overlap writes no run record. Handler
    /// failures are recorded as Failure outcomes and returned as `Ok`.
    pub async fn execute(&self, task_id: &str) -> Result<Outcome, SchedulerError> {
        let Some((handler, settings)) = self.registry.dispatch_parts(task_id).await else {
            return Err(SchedulerError::TaskNotFound(task_id.to_string()));
        };
        self.registry.record_start(task_id).await?;
        let started_at = Utc::now();

        let run_id = match self.ledger.append_start(task_id, started_at).await {
            Ok(id) => Some(id),
            Err(e) => {
                // Best-effort persistence: the in-memory registry still
                // reflects the attempt even when the durable write failed.
                warn!(task_id, "Run ledger append failed: {e}");
                None
            }
        };

        let ctx = TaskContext {
            task_id: task_id.to_string(),
            fired_at: started_at,
            settings,
        };
        let result = handler.run(ctx).await;

        let (outcome, message, payload) = match result {
            Ok(TaskResult {
                success: true,
                message,
                data,
                ..
            }) => (Outcome::Success, message, data),
            Ok(TaskResult {
                message,
                data,
                error,
                ..
            }) => (Outcome::Failure, error.unwrap_or(message), data),
            Err(e) => (Outcome::Failure, format!("{e:#}"), None),
        };

        let finished_at = Utc::now();
        if let Some(run_id) = run_id {
            if let Err(e) = self
                .ledger
                .finalize(run_id, finished_at, outcome, &message, payload)
                .await
            {
                warn!(task_id, run_id, "Run ledger finalize failed: {e}");
            }
        }
        self.registry
            .record_result(task_id, outcome, &message, finished_at)
            .await;

        match outcome {
            Outcome::Success => info!(task_id, "Task completed: {message}"),
            Outcome::Failure => warn!(task_id, "Task failed: {message}"),
        }

        let registry = self.registry.clone();
        let id = task_id.to_string();
        let cooldown = self.cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            registry.reset_if_settled(&id).await;
        });

        Ok(outcome)
    }
}
