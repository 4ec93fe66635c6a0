//! ritmo-types: shared domain types for the ritmo scheduler.

pub mod rule;

pub use rule::{RuleError, ScheduleRule};

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Task Types ────────────────────

/// Lifecycle status of a scheduled task.
///
/// `Running` is held only while the execution engine owns the task's
/// execution slot; `Completed`/`Failed` revert to `Idle` after the
/// cool-down window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// A registered task as observers see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Stable task id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Recurrence rule.
    pub rule: ScheduleRule,
    /// Whether the scheduler dispatches this task.
    pub enabled: bool,
    /// Start time of the most recent run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Next instant the rule fires, recomputed after every run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    /// Message reported by the most recent run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Current status.
    pub status: TaskStatus,
}

/// Configuration shape for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Display name.
    pub name: String,
    /// Recurrence rule.
    pub rule: ScheduleRule,
    /// Whether the scheduler dispatches this task.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Argv for the subprocess handler backing this task.
    #[serde(default)]
    pub command: Vec<String>,
    /// Opaque settings passed through to the handler.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub settings: HashMap<String, serde_json::Value>,
}

/// Input handed to a task handler for one execution.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Id of the task (or `service:<name>` for service passes).
    pub task_id: String,
    /// When this execution was dispatched.
    pub fired_at: DateTime<Utc>,
    /// Opaque settings from the task or service configuration.
    pub settings: serde_json::Value,
}

/// Output of one task handler run.
///
/// A handler may also return `Err`; both `success == false` and `Err` are
/// recorded as a Failure outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    /// A successful result with the given message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    /// A failed result with the given error description.
    pub fn fail(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: error.clone(),
            data: None,
            error: Some(error),
        }
    }
}

// ──────────────────── Run Records ────────────────────

/// Terminal outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution attempt as recorded in the run ledger.
///
/// Created open at dispatch time, finalized exactly once at completion and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Monotonic record id.
    pub id: i64,
    /// Id of the executed task.
    pub task_id: String,
    /// Dispatch time.
    pub started_at: DateTime<Utc>,
    /// Completion time; None while the run is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal outcome; None while the run is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Human-readable result message.
    pub message: String,
    /// Opaque handler payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

// ──────────────────── Service Types ────────────────────

/// The fixed set of background services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Cleanup,
    CalendarSync,
    Enrichment,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cleanup => "cleanup",
            Self::CalendarSync => "calendar_sync",
            Self::Enrichment => "enrichment",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a background service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Service is not running.
    Stopped,
    /// Service is initializing.
    Starting,
    /// Service loop is active.
    Running,
    /// Service encountered an error.
    Error(String),
}

/// Point-in-time view of one orchestrated service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub kind: ServiceKind,
    /// Configured enabled flag.
    pub enabled: bool,
    /// Computed on every read, never persisted.
    pub credentials_available: bool,
    /// Current status.
    pub status: ServiceStatus,
}

fn default_true() -> bool {
    true
}
