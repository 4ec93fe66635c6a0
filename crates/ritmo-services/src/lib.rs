//! ritmo-services: background workers and their orchestrator.
//!
//! Three long-lived services run alongside the scheduler: expired-data
//! cleanup, external calendar sync, and AI enrichment. Each owns an
//! interval loop with a deterministic stop path; calendar sync and
//! enrichment are credential-gated. The [`ServiceOrchestrator`] owns their
//! lifecycle — a service that fails to start never takes the others down.

pub mod orchestrator;
pub mod service;
pub mod workers;

pub use orchestrator::{CredentialProbe, InitReport, ServiceOrchestrator};
pub use service::BackgroundService;
pub use workers::{IntervalService, calendar_sync_service, cleanup_service, enrichment_service};
