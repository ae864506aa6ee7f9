//! Background solver dispatcher.
//!
//! Polls for `pending` simulations and runs each on the solver engine,
//! bounded by the configured number of solver slots. Claiming is a
//! compare-and-set `pending -> running` in the store, so a record deleted
//! before its turn is simply never started.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use simflow_core::events::{
    EVENT_SIMULATION_COMPLETED, EVENT_SIMULATION_FAILED, EVENT_SIMULATION_RUNNING,
};
use simflow_core::simulation::{Simulation, SimulationStatus};
use simflow_core::types::EntityId;
use simflow_engine::{EngineError, SolveSpec, SolverEngine};
use simflow_events::{EventBus, LifecycleEvent};
use simflow_store::SimulationStore;

use crate::config::OrchestratorConfig;
use crate::storage;

/// Supervises solver execution for submitted simulations.
///
/// Created once at startup; the `Arc` is cheaply cloned into handlers so
/// deletion can signal best-effort cancellation.
pub struct SolverDispatcher {
    store: Arc<SimulationStore>,
    engine: Arc<dyn SolverEngine>,
    events: Arc<EventBus>,
    config: Arc<OrchestratorConfig>,
    /// Bounded solver concurrency; queued work stays `pending` in the store.
    slots: Arc<Semaphore>,
    /// Cancellation tokens for in-flight runs, indexed by simulation id.
    running: RwLock<HashMap<EntityId, CancellationToken>>,
}

impl SolverDispatcher {
    pub fn new(
        store: Arc<SimulationStore>,
        engine: Arc<dyn SolverEngine>,
        events: Arc<EventBus>,
        config: Arc<OrchestratorConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            slots: Arc::new(Semaphore::new(config.solver_slots)),
            store,
            engine,
            events,
            config,
            running: RwLock::new(HashMap::new()),
        })
    }

    /// Run the dispatch loop until the cancellation token is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            solver_slots = self.config.solver_slots,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Solver dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Solver dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    Arc::clone(&self).dispatch_cycle(&cancel).await;
                }
            }
        }
    }

    /// One dispatch cycle: claim pending records while slots are free.
    async fn dispatch_cycle(self: Arc<Self>, shutdown: &CancellationToken) {
        loop {
            let permit = match Arc::clone(&self.slots).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break, // all slots busy
            };

            let Some(sim) = self.store.claim_next_pending().await else {
                break; // nothing waiting; the permit is released on drop
            };

            tracing::info!(
                simulation_id = %sim.id,
                kind = %sim.kind,
                "Simulation claimed for execution",
            );
            self.events.publish(
                LifecycleEvent::new(EVENT_SIMULATION_RUNNING)
                    .with_source("simulation", sim.id.clone())
                    .with_payload(serde_json::json!({
                        "name": sim.name,
                        "type": sim.kind,
                    })),
            );

            let token = shutdown.child_token();
            self.running
                .write()
                .await
                .insert(sim.id.clone(), token.clone());

            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.supervise(sim, token, permit).await;
            });
        }
    }

    /// Run one simulation to its terminal state.
    ///
    /// The permit is held for the duration of the run; dropping it frees
    /// the slot for the next queued record.
    async fn supervise(
        self: Arc<Self>,
        sim: Simulation,
        token: CancellationToken,
        _permit: OwnedSemaphorePermit,
    ) {
        let spec = SolveSpec {
            simulation_id: sim.id.clone(),
            kind: sim.kind,
            case_dir: storage::case_dir(&self.config.data_root, &sim.config_path),
            result_dir: storage::result_dir(&self.config.data_root, &sim.result_path),
        };

        let outcome = tokio::time::timeout(self.config.job_timeout, self.engine.run(&spec, &token)).await;

        match outcome {
            Ok(Ok(())) => {
                self.record_completed(&sim).await;
            }
            Ok(Err(EngineError::Cancelled)) => {
                // Usually the record is already gone (deletion cancelled us);
                // if it still exists, record the interruption.
                self.record_failed(&sim, "Execution cancelled".to_string(), "cancelled")
                    .await;
            }
            Ok(Err(e)) => {
                self.record_failed(&sim, e.to_string(), "execution").await;
            }
            Err(_) => {
                // The engine future was dropped, which kills the child
                // process; the token is cancelled for engines with other
                // cleanup.
                token.cancel();
                let cause = format!(
                    "Execution timed out after {}s",
                    self.config.job_timeout.as_secs()
                );
                self.record_failed(&sim, cause, "timeout").await;
            }
        }

        self.running.write().await.remove(&sim.id);
    }

    async fn record_completed(&self, sim: &Simulation) {
        match self
            .store
            .transition(&sim.id, SimulationStatus::Running, |s| s.mark_completed())
            .await
        {
            Ok(updated) => {
                tracing::info!(simulation_id = %sim.id, "Simulation completed");
                self.events.publish(
                    LifecycleEvent::new(EVENT_SIMULATION_COMPLETED)
                        .with_source("simulation", sim.id.clone())
                        .with_payload(serde_json::json!({
                            "resultPath": updated.result_path,
                        })),
                );
            }
            Err(e) => {
                tracing::debug!(simulation_id = %sim.id, error = %e, "Completion not recorded");
            }
        }
    }

    async fn record_failed(&self, sim: &Simulation, cause: String, reason: &str) {
        match self
            .store
            .transition(&sim.id, SimulationStatus::Running, |s| {
                s.mark_failed(cause.clone())
            })
            .await
        {
            Ok(_) => {
                tracing::warn!(simulation_id = %sim.id, reason, error = %cause, "Simulation failed");
                self.events.publish(
                    LifecycleEvent::new(EVENT_SIMULATION_FAILED)
                        .with_source("simulation", sim.id.clone())
                        .with_payload(serde_json::json!({
                            "error": cause,
                            "reason": reason,
                        })),
                );
            }
            Err(e) => {
                tracing::debug!(simulation_id = %sim.id, error = %e, "Failure not recorded");
            }
        }
    }

    /// Best-effort cancellation of an in-flight run.
    ///
    /// Returns whether a live run was signalled. Safe to call for records
    /// in any state.
    pub async fn cancel(&self, id: &str) -> bool {
        if let Some(token) = self.running.read().await.get(id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Reconciliation pass: terminate runs whose record no longer exists,
    /// and force-fail `running` records whose supervisor is gone and whose
    /// run budget has expired (crash backstop).
    pub async fn reconcile(&self) {
        let live: Vec<(EntityId, CancellationToken)> = self
            .running
            .read()
            .await
            .iter()
            .map(|(id, token)| (id.clone(), token.clone()))
            .collect();

        for (id, token) in &live {
            if self.store.get(id).await.is_none() {
                tracing::warn!(simulation_id = %id, "Reconciliation: terminating orphaned solver run");
                token.cancel();
            }
        }

        let live_ids: Vec<&EntityId> = live.iter().map(|(id, _)| id).collect();
        for sim in self.store.list().await {
            if sim.status != SimulationStatus::Running || live_ids.contains(&&sim.id) {
                continue;
            }
            let expired = sim
                .started_at
                .map(|t| {
                    Utc::now()
                        .signed_duration_since(t)
                        .to_std()
                        .map(|age| age > self.config.job_timeout)
                        .unwrap_or(false)
                })
                .unwrap_or(false);
            if expired {
                let cause = format!(
                    "Execution timed out after {}s",
                    self.config.job_timeout.as_secs()
                );
                self.record_failed(&sim, cause, "timeout").await;
            }
        }
    }
}
