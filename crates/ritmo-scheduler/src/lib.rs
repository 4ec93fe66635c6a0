//! ritmo-scheduler: recurring task scheduling and execution.
//!
//! The pieces, leaves first:
//! - [`handler::TaskHandler`] — the opaque unit-of-work contract.
//! - [`registry::TaskRegistry`] — task definitions, status transitions and
//!   the re-entrancy guard.
//! - [`executor::Executor`] — runs one handler with ledger and registry
//!   bookkeeping, then resets status after a cool-down.
//! - [`tick::SchedulerLoop`] — the periodic driver that evaluates rules
//!   and dispatches due tasks, at most once per period.

pub mod executor;
pub mod handler;
pub mod registry;
pub mod tick;

use thiserror::Error;

/// Errors surfaced by the registry and execution engine.
///
/// Handler failures are never errors — they are recorded as Failure
/// outcomes. A failure in one task never crashes the loop driving the
/// others.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Re-entrancy guard: a prior execution of this task has not finished.
    #[error("task {0} is already running")]
    AlreadyRunning(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error(transparent)]
    Ledger(#[from] ritmo_ledger::LedgerError),
}

pub use executor::Executor;
pub use handler::{CommandHandler, TaskHandler};
pub use registry::TaskRegistry;
pub use tick::SchedulerLoop;
