//! Background service contract.

use async_trait::async_trait;

use ritmo_types::{ServiceKind, ServiceStatus};

/// A long-lived, independently toggleable background worker.
///
/// Use `&self` for all methods — implementations keep mutable state behind
/// interior mutability so the orchestrator can share them freely.
#[async_trait]
pub trait BackgroundService: Send + Sync {
    /// Which orchestrated slot this service fills.
    fn kind(&self) -> ServiceKind;

    /// Start the service's background loop.
    ///
    /// Fails when the service is already running.
    async fn start(&self) -> anyhow::Result<()>;

    /// Stop the background loop. Idempotent; a pass that is already in
    /// flight finishes before the loop exits.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Current status.
    fn status(&self) -> ServiceStatus;
}
