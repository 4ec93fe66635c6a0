//! Task registry: definitions, status transitions and the re-entrancy guard.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use ritmo_types::{Outcome, TaskDefinition, TaskSpec, TaskStatus};

use crate::SchedulerError;
use crate::handler::TaskHandler;

struct RegisteredTask {
    def: TaskDefinition,
    settings: serde_json::Value,
    handler: Arc<dyn TaskHandler>,
}

/// Holds every task definition together with its handler.
///
/// All mutation goes through this registry. A task's status is `Running`
/// only between a successful `record_start` and the matching
/// `record_result`; that window is the execution lock.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, RegisteredTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a task from its config spec. Replaces any existing task
    /// with the same id, so there is at most one definition per id.
    pub async fn register(&self, id: &str, spec: &TaskSpec, handler: Arc<dyn TaskHandler>) {
        let def = TaskDefinition {
            id: id.to_string(),
            name: spec.name.clone(),
            rule: spec.rule,
            enabled: spec.enabled,
            last_run: None,
            next_run: Some(spec.rule.next_run(Utc::now())),
            last_message: None,
            status: TaskStatus::Idle,
        };
        let settings = serde_json::Value::Object(spec.settings.clone().into_iter().collect());
        info!(task_id = %id, rule = %spec.rule, enabled = spec.enabled, "Registering task");
        self.tasks.write().await.insert(
            id.to_string(),
            RegisteredTask {
                def,
                settings,
                handler,
            },
        );
    }

    /// Get one task definition.
    pub async fn get(&self, id: &str) -> Option<TaskDefinition> {
        self.tasks.read().await.get(id).map(|t| t.def.clone())
    }

    /// Handler and settings for dispatching one task.
    pub async fn dispatch_parts(
        &self,
        id: &str,
    ) -> Option<(Arc<dyn TaskHandler>, serde_json::Value)> {
        self.tasks
            .read()
            .await
            .get(id)
            .map(|t| (t.handler.clone(), t.settings.clone()))
    }

    /// All task definitions, sorted by id for stable output.
    pub async fn list(&self) -> Vec<TaskDefinition> {
        let mut defs: Vec<_> = self
            .tasks
            .read()
            .await
            .values()
            .map(|t| t.def.clone())
            .collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs
    }

    /// Enable or disable a task. Returns false when the id is unknown.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(id) {
            Some(task) => {
                task.def.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Claim the task's execution slot by transitioning to Running.
    ///
    /// Fails with `AlreadyRunning` when a prior execution has not finished;
    /// this is the non-overlap guard.
    pub async fn record_start(&self, id: &str) -> Result<(), SchedulerError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;
        if task.def.status == TaskStatus::Running {
            return Err(SchedulerError::AlreadyRunning(id.to_string()));
        }
        task.def.status = TaskStatus::Running;
        Ok(())
    }

    /// Record a finished run: status, last-run/message and the recomputed
    /// next-run. Returns false when the id is unknown.
    pub async fn record_result(
        &self,
        id: &str,
        outcome: Outcome,
        message: &str,
        at: DateTime<Utc>,
    ) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(id) else {
            return false;
        };
        task.def.status = match outcome {
            Outcome::Success => TaskStatus::Completed,
            Outcome::Failure => TaskStatus::Failed,
        };
        task.def.last_run = Some(at);
        task.def.next_run = Some(task.def.rule.next_run(at));
        task.def.last_message = Some(message.to_string());
        true
    }

    /// Cool-down reset: Completed/Failed back to Idle. Never touches a
    /// Running task.
    pub async fn reset_if_settled(&self, id: &str) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(id) {
            if matches!(task.def.status, TaskStatus::Completed | TaskStatus::Failed) {
                task.def.status = TaskStatus::Idle;
            }
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
