//! Service orchestrator: lifecycle for the fixed set of background services.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use ritmo_types::{ServiceDescriptor, ServiceKind, ServiceStatus};

use crate::service::BackgroundService;

/// Credential availability probe, injected at construction.
///
/// Must never error: a missing credential is simply `false`.
pub type CredentialProbe = Arc<dyn Fn(ServiceKind) -> bool + Send + Sync>;

/// Result of [`ServiceOrchestrator::initialize`].
#[derive(Debug, Default)]
pub struct InitReport {
    pub started: Vec<ServiceKind>,
    pub failed: Vec<ServiceKind>,
    pub errors: Vec<String>,
}

struct ServiceSlot {
    service: Arc<dyn BackgroundService>,
    enabled: bool,
}

/// Owns the background services and their enabled flags.
///
/// Invariant: a service is running only while it is enabled and its
/// credential probe passed when it was started. Partial failure during
/// initialization never takes down the remaining services.
pub struct ServiceOrchestrator {
    slots: RwLock<HashMap<ServiceKind, ServiceSlot>>,
    probe: CredentialProbe,
}

impl ServiceOrchestrator {
    pub fn new(probe: CredentialProbe) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            probe,
        }
    }

    /// Register a service with its configured enabled flag. One slot per
    /// kind; a second registration replaces the first.
    pub async fn register(&self, service: Arc<dyn BackgroundService>, enabled: bool) {
        let kind = service.kind();
        info!(service = %kind, enabled, "Registering service");
        self.slots
            .write()
            .await
            .insert(kind, ServiceSlot { service, enabled });
    }

    /// Start every enabled service that passes its credential check.
    ///
    /// Services are attempted independently: a credential miss or start
    /// error is recorded in the report and the orchestrator moves on.
    pub async fn initialize(&self) -> InitReport {
        let mut report = InitReport::default();
        let slots = self.slots.read().await;

        // Stable order keeps logs and reports deterministic.
        let mut kinds: Vec<_> = slots.keys().copied().collect();
        kinds.sort();

        for kind in kinds {
            let slot = &slots[&kind];
            if !slot.enabled {
                continue;
            }

            if !(self.probe)(kind) {
                warn!(service = %kind, "Not started: credentials not available");
                report.failed.push(kind);
                report.errors.push(format!("{kind}: credentials not available"));
                continue;
            }

            match slot.service.start().await {
                Ok(()) => {
                    info!(service = %kind, "Service started");
                    report.started.push(kind);
                }
                Err(e) => {
                    warn!(service = %kind, "Failed to start: {e:#}");
                    report.failed.push(kind);
                    report.errors.push(format!("{kind}: {e:#}"));
                }
            }
        }

        report
    }

    /// Enable or disable one service. Idempotent in both directions:
    /// enabling a running service and disabling a stopped one are no-ops.
    pub async fn toggle(&self, kind: ServiceKind, enabled: bool) -> anyhow::Result<()> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&kind)
            .ok_or_else(|| anyhow::anyhow!("service not registered: {kind}"))?;
        slot.enabled = enabled;

        if enabled {
            if slot.service.status() == ServiceStatus::Running {
                return Ok(());
            }
            if !(self.probe)(kind) {
                anyhow::bail!("{kind}: credentials not available");
            }
            slot.service.start().await
        } else {
            slot.service.stop().await
        }
    }

    /// Point-in-time descriptors, sorted by kind. Credential availability
    /// is recomputed on every call, never persisted.
    pub async fn descriptors(&self) -> Vec<ServiceDescriptor> {
        let slots = self.slots.read().await;
        let mut out: Vec<_> = slots
            .iter()
            .map(|(kind, slot)| ServiceDescriptor {
                kind: *kind,
                enabled: slot.enabled,
                credentials_available: (self.probe)(*kind),
                status: slot.service.status(),
            })
            .collect();
        out.sort_by_key(|d| d.kind);
        out
    }

    /// Stop every service. The process teardown path.
    pub async fn shutdown(&self) {
        let slots = self.slots.read().await;
        for (kind, slot) in slots.iter() {
            if let Err(e) = slot.service.stop().await {
                warn!(service = %kind, "Failed to stop service: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    /// A mock service for testing the orchestrator.
    struct MockService {
        kind: ServiceKind,
        state: AtomicU8, // 0=stopped, 1=running
    }

    impl MockService {
        fn new(kind: ServiceKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                state: AtomicU8::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl BackgroundService for MockService {
        fn kind(&self) -> ServiceKind {
            self.kind
        }

        async fn start(&self) -> anyhow::Result<()> {
            self.state.store(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.state.store(0, Ordering::SeqCst);
            Ok(())
        }

        fn status(&self) -> ServiceStatus {
            match self.state.load(Ordering::SeqCst) {
                1 => ServiceStatus::Running,
                _ => ServiceStatus::Stopped,
            }
        }
    }

    fn probe_all() -> CredentialProbe {
        Arc::new(|_| true)
    }

    fn probe_denying(denied: ServiceKind) -> CredentialProbe {
        Arc::new(move |kind| kind != denied)
    }

    #[tokio::test]
    async fn test_initialize_starts_enabled_services() {
        let orch = ServiceOrchestrator::new(probe_all());
        orch.register(MockService::new(ServiceKind::Cleanup), true).await;
        orch.register(MockService::new(ServiceKind::CalendarSync), false)
            .await;

        let report = orch.initialize().await;
        assert_eq!(report.started, vec![ServiceKind::Cleanup]);
        assert!(report.failed.is_empty());

        let descriptors = orch.descriptors().await;
        assert_eq!(descriptors[0].status, ServiceStatus::Running);
        assert_eq!(descriptors[1].status, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        // Calendar sync has no credentials; cleanup must still come up.
        let orch = ServiceOrchestrator::new(probe_denying(ServiceKind::CalendarSync));
        orch.register(MockService::new(ServiceKind::Cleanup), true).await;
        orch.register(MockService::new(ServiceKind::CalendarSync), true)
            .await;

        let report = orch.initialize().await;
        assert_eq!(report.started, vec![ServiceKind::Cleanup]);
        assert_eq!(report.failed, vec![ServiceKind::CalendarSync]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("credentials not available"));

        let descriptors = orch.descriptors().await;
        let cleanup = &descriptors[0];
        assert_eq!(cleanup.kind, ServiceKind::Cleanup);
        assert_eq!(cleanup.status, ServiceStatus::Running);
        let sync = &descriptors[1];
        assert_eq!(sync.kind, ServiceKind::CalendarSync);
        assert_eq!(sync.status, ServiceStatus::Stopped);
        assert!(!sync.credentials_available);
        // Still marked enabled: the operator asked for it.
        assert!(sync.enabled);
    }

    #[tokio::test]
    async fn test_toggle_off_is_idempotent() {
        let orch = ServiceOrchestrator::new(probe_all());
        orch.register(MockService::new(ServiceKind::Cleanup), true).await;
        orch.initialize().await;

        orch.toggle(ServiceKind::Cleanup, false).await.unwrap();
        let descriptors = orch.descriptors().await;
        assert_eq!(descriptors[0].status, ServiceStatus::Stopped);
        assert!(!descriptors[0].enabled);

        // Second disable: same state, no error.
        orch.toggle(ServiceKind::Cleanup, false).await.unwrap();
        assert_eq!(orch.descriptors().await[0].status, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_toggle_on_respects_credentials() {
        let orch = ServiceOrchestrator::new(probe_denying(ServiceKind::Enrichment));
        orch.register(MockService::new(ServiceKind::Enrichment), false)
            .await;

        let err = orch.toggle(ServiceKind::Enrichment, true).await.unwrap_err();
        assert!(err.to_string().contains("credentials not available"));
        assert_eq!(orch.descriptors().await[0].status, ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_toggle_on_then_on_again_is_a_noop() {
        let orch = ServiceOrchestrator::new(probe_all());
        orch.register(MockService::new(ServiceKind::Cleanup), false)
            .await;

        orch.toggle(ServiceKind::Cleanup, true).await.unwrap();
        orch.toggle(ServiceKind::Cleanup, true).await.unwrap();
        assert_eq!(orch.descriptors().await[0].status, ServiceStatus::Running);
    }

    #[tokio::test]
    async fn test_toggle_unknown_service() {
        let orch = ServiceOrchestrator::new(probe_all());
        assert!(orch.toggle(ServiceKind::Cleanup, true).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let orch = ServiceOrchestrator::new(probe_all());
        orch.register(MockService::new(ServiceKind::Cleanup), true).await;
        orch.register(MockService::new(ServiceKind::Enrichment), true)
            .await;
        orch.initialize().await;

        orch.shutdown().await;
        assert!(
            orch.descriptors()
                .await
                .iter()
                .all(|d| d.status == ServiceStatus::Stopped)
        );
    }
}
