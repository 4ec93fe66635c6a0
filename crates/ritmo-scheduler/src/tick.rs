//! Scheduler loop: the periodic tick driver.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ritmo_ledger::RunStore;

use crate::SchedulerError;
use crate::executor::Executor;
use crate::registry::TaskRegistry;

/// Drives periodic evaluation of the task registry.
///
/// One evaluation happens shortly after start (the settle delay, so
/// registration can finish first), then on a fixed cadence. Stopping
/// cancels future ticks only: in-flight dispatches always run to
/// completion, a handler is never killed.
pub struct SchedulerLoop {
    registry: Arc<TaskRegistry>,
    executor: Arc<Executor>,
    ledger: Arc<dyn RunStore>,
    tick_interval: Duration,
    settle_delay: Duration,
    state: Mutex<LoopState>,
}

struct LoopState {
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerLoop {
    pub fn new(
        registry: Arc<TaskRegistry>,
        executor: Arc<Executor>,
        ledger: Arc<dyn RunStore>,
        tick_interval: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            ledger,
            tick_interval,
            settle_delay,
            state: Mutex::new(LoopState {
                cancel: None,
                handle: None,
            }),
        }
    }

    /// Start the tick driver. Fails when it is already running.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            anyhow::bail!("scheduler loop is already running");
        }

        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run(cancel_child).await;
        });

        state.cancel = Some(cancel);
        state.handle = Some(handle);
        Ok(())
    }

    /// Stop the tick driver. Idempotent.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = state.handle.take() {
            let _ = handle.await;
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(
            tick_secs = self.tick_interval.as_secs(),
            "Scheduler loop started"
        );

        // Settle delay before the first evaluation.
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Scheduler loop stopped");
                return;
            }
            _ = tokio::time::sleep(self.settle_delay) => {}
        }

        loop {
            self.tick(Utc::now()).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.tick_interval) => {}
            }
        }

        info!("Scheduler loop stopped");
    }

    /// Evaluate every registered task against `now` and dispatch the due
    /// ones, each independently of the others.
    pub async fn tick(&self, now: DateTime<Utc>) {
        for def in self.registry.list().await {
            if !def.enabled || !def.rule.is_due(now) {
                continue;
            }

            // At-most-once per period: skip when a run already started
            // inside the current period, even if the tick fired twice.
            let period_start = def.rule.period_start(now);
            match self.ledger.has_run_since(&def.id, period_start).await {
                Ok(true) => {
                    debug!(task_id = %def.id, "Already ran this period, skipping");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(task_id = %def.id, "Ledger probe failed, dispatching anyway: {e}");
                }
            }

            let executor = self.executor.clone();
            let task_id = def.id.clone();
            tokio::spawn(async move {
                match executor.execute(&task_id).await {
                    Ok(outcome) => debug!(task_id, %outcome, "Dispatch finished"),
                    Err(SchedulerError::AlreadyRunning(_)) => {
                        debug!(task_id, "Still running from an earlier dispatch, skipping");
                    }
                    Err(e) => warn!(task_id, "Dispatch failed: {e}"),
                }
            });
        }
    }
}
