//! Background visualization provisioner.
//!
//! Polls for `pending` sessions and boots a rendering worker for each once
//! its simulation has completed, bounded by the configured number of
//! rendering slots. Worker handles stay registered for the life of the
//! session so deletion (and reconciliation) can tear them down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use simflow_core::events::{
    EVENT_VISUALIZATION_FAILED, EVENT_VISUALIZATION_READY, EVENT_VISUALIZATION_RUNNING,
};
use simflow_core::simulation::SimulationStatus;
use simflow_core::types::EntityId;
use simflow_core::visualization::{Visualization, VisualizationStatus};
use simflow_engine::{EngineError, RenderBackend, RenderSpec, RenderWorkerHandle};
use simflow_events::{EventBus, LifecycleEvent};
use simflow_store::{SimulationStore, VisualizationStore};

use crate::config::OrchestratorConfig;
use crate::storage;

/// What a provisioning cycle decides to do with one pending session.
enum Gate {
    /// The simulation is completed — provision now (slot permitting).
    Go,
    /// The simulation is still on its way; keep waiting.
    Wait,
    /// The session can never become ready — fail it with this cause.
    FailNow(String),
}

/// Supervises rendering workers for visualization sessions.
pub struct RenderProvisioner {
    sessions: Arc<VisualizationStore>,
    simulations: Arc<SimulationStore>,
    backend: Arc<dyn RenderBackend>,
    events: Arc<EventBus>,
    config: Arc<OrchestratorConfig>,
    /// Bounded rendering concurrency.
    slots: Arc<Semaphore>,
    /// Live worker handles for `ready` sessions, indexed by session id.
    workers: Mutex<HashMap<EntityId, Box<dyn RenderWorkerHandle>>>,
    /// Cancellation tokens for sessions still provisioning.
    in_flight: RwLock<HashMap<EntityId, CancellationToken>>,
}

impl RenderProvisioner {
    pub fn new(
        sessions: Arc<VisualizationStore>,
        simulations: Arc<SimulationStore>,
        backend: Arc<dyn RenderBackend>,
        events: Arc<EventBus>,
        config: Arc<OrchestratorConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            slots: Arc::new(Semaphore::new(config.render_slots)),
            sessions,
            simulations,
            backend,
            events,
            config,
            workers: Mutex::new(HashMap::new()),
            in_flight: RwLock::new(HashMap::new()),
        })
    }

    /// Run the provisioning loop until the cancellation token is triggered.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            render_slots = self.config.render_slots,
            provision_timeout_secs = self.config.provision_timeout.as_secs(),
            "Render provisioner started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Render provisioner shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    Arc::clone(&self).provision_cycle(&cancel).await;
                }
            }
        }
    }

    /// One cycle over the pending sessions.
    async fn provision_cycle(self: Arc<Self>, shutdown: &CancellationToken) {
        for viz in self.sessions.list_pending().await {
            let gate = match self.simulations.get(&viz.simulation_id).await {
                None => Gate::FailNow(format!(
                    "Simulation {} was deleted before provisioning started",
                    viz.simulation_id
                )),
                Some(sim) => match sim.status {
                    SimulationStatus::Completed => Gate::Go,
                    SimulationStatus::Failed => Gate::FailNow(format!(
                        "Simulation {} failed; there are no results to visualize",
                        sim.id
                    )),
                    SimulationStatus::Pending | SimulationStatus::Running => Gate::Wait,
                },
            };

            match gate {
                Gate::FailNow(cause) => {
                    self.fail_session(&viz.id, VisualizationStatus::Pending, cause, "provisioning")
                        .await;
                }
                Gate::Wait => {
                    // A session whose simulation never completes must fail
                    // rather than hang.
                    if self.budget_exhausted(&viz) {
                        let cause = format!(
                            "Provisioning timed out after {}s waiting for simulation {}",
                            self.config.provision_timeout.as_secs(),
                            viz.simulation_id
                        );
                        self.fail_session(&viz.id, VisualizationStatus::Pending, cause, "timeout")
                            .await;
                    }
                }
                Gate::Go => {
                    let permit = match Arc::clone(&self.slots).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            // No slot; waiting for one still burns the budget.
                            if self.budget_exhausted(&viz) {
                                let cause = format!(
                                    "Provisioning timed out after {}s waiting for a rendering slot",
                                    self.config.provision_timeout.as_secs()
                                );
                                self.fail_session(
                                    &viz.id,
                                    VisualizationStatus::Pending,
                                    cause,
                                    "timeout",
                                )
                                .await;
                            }
                            continue;
                        }
                    };

                    // Claim under CAS so the session is provisioned once.
                    let worker_name = format!("viz-{}", viz.id);
                    let claimed = self
                        .sessions
                        .transition(&viz.id, VisualizationStatus::Pending, |v| {
                            v.mark_provisioning(worker_name.clone())
                        })
                        .await;
                    let Ok(claimed) = claimed else { continue };

                    self.events.publish(
                        LifecycleEvent::new(EVENT_VISUALIZATION_RUNNING)
                            .with_source("visualization", claimed.id.clone())
                            .with_payload(serde_json::json!({
                                "workerRef": worker_name,
                            })),
                    );

                    let token = shutdown.child_token();
                    self.in_flight
                        .write()
                        .await
                        .insert(claimed.id.clone(), token.clone());

                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.provision(claimed, token, permit).await;
                    });
                }
            }
        }
    }

    /// Boot the worker for one claimed session and wait for readiness.
    async fn provision(
        self: Arc<Self>,
        viz: Visualization,
        token: CancellationToken,
        _permit: OwnedSemaphorePermit,
    ) {
        let spec = RenderSpec {
            session_id: viz.id.clone(),
            worker_name: format!("viz-{}", viz.id),
            data_dir: storage::result_dir(&self.config.data_root, &viz.result_path),
        };

        match self.backend.launch(&spec).await {
            Err(e) => {
                self.fail_session(
                    &viz.id,
                    VisualizationStatus::Running,
                    format!("Failed to launch rendering worker: {e}"),
                    "provisioning",
                )
                .await;
            }
            Ok(mut handle) => {
                let budget = self.remaining_budget(&viz);
                let outcome = tokio::time::timeout(budget, handle.await_ready(&token)).await;

                match outcome {
                    Ok(Ok(endpoint)) => {
                        let updated = self
                            .sessions
                            .transition(&viz.id, VisualizationStatus::Running, |v| {
                                v.mark_ready(endpoint.clone())
                            })
                            .await;

                        match updated {
                            Ok(_) => {
                                tracing::info!(
                                    session_id = %viz.id,
                                    endpoint = %endpoint,
                                    "Visualization ready",
                                );
                                self.workers.lock().await.insert(viz.id.clone(), handle);
                                self.events.publish(
                                    LifecycleEvent::new(EVENT_VISUALIZATION_READY)
                                        .with_source("visualization", viz.id.clone())
                                        .with_payload(serde_json::json!({
                                            "streamEndpoint": endpoint,
                                        })),
                                );
                            }
                            Err(e) => {
                                // Deleted while we were waiting; the worker
                                // is unreferenced now.
                                tracing::debug!(session_id = %viz.id, error = %e, "Ready not recorded");
                                handle.terminate().await;
                            }
                        }
                    }
                    Ok(Err(EngineError::Cancelled)) => {
                        handle.terminate().await;
                        self.fail_session(
                            &viz.id,
                            VisualizationStatus::Running,
                            "Provisioning cancelled".to_string(),
                            "cancelled",
                        )
                        .await;
                    }
                    Ok(Err(e)) => {
                        handle.terminate().await;
                        self.fail_session(
                            &viz.id,
                            VisualizationStatus::Running,
                            format!("Rendering worker never became ready: {e}"),
                            "provisioning",
                        )
                        .await;
                    }
                    Err(_) => {
                        handle.terminate().await;
                        let cause = format!(
                            "Provisioning timed out after {}s",
                            self.config.provision_timeout.as_secs()
                        );
                        self.fail_session(&viz.id, VisualizationStatus::Running, cause, "timeout")
                            .await;
                    }
                }
            }
        }

        self.in_flight.write().await.remove(&viz.id);
    }

    /// Tear down the session's worker (live or still provisioning).
    /// Idempotent; called on deletion and by reconciliation.
    pub async fn teardown(&self, id: &str) {
        if let Some(token) = self.in_flight.read().await.get(id) {
            token.cancel();
        }
        if let Some(mut handle) = self.workers.lock().await.remove(id) {
            tracing::info!(session_id = %id, worker = %handle.worker_ref(), "Tearing down rendering worker");
            handle.terminate().await;
        }
    }

    /// Reconciliation pass: terminate workers whose session record no
    /// longer exists.
    pub async fn reconcile(&self) {
        let worker_ids: Vec<EntityId> = self.workers.lock().await.keys().cloned().collect();
        for id in worker_ids {
            if self.sessions.get(&id).await.is_none() {
                tracing::warn!(session_id = %id, "Reconciliation: terminating orphaned rendering worker");
                self.teardown(&id).await;
            }
        }

        let in_flight_ids: Vec<EntityId> = self.in_flight.read().await.keys().cloned().collect();
        for id in in_flight_ids {
            if self.sessions.get(&id).await.is_none() {
                tracing::warn!(session_id = %id, "Reconciliation: cancelling orphaned provisioning");
                if let Some(token) = self.in_flight.read().await.get(&id) {
                    token.cancel();
                }
            }
        }
    }

    /// Terminate every live worker. Used during graceful shutdown.
    pub async fn shutdown(&self) {
        for token in self.in_flight.read().await.values() {
            token.cancel();
        }
        let mut workers = self.workers.lock().await;
        let count = workers.len();
        for (id, mut handle) in workers.drain() {
            tracing::info!(session_id = %id, "Stopping rendering worker");
            handle.terminate().await;
        }
        if count > 0 {
            tracing::info!(count, "All rendering workers stopped");
        }
    }

    fn session_age(&self, viz: &Visualization) -> Duration {
        Utc::now()
            .signed_duration_since(viz.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn budget_exhausted(&self, viz: &Visualization) -> bool {
        self.session_age(viz) > self.config.provision_timeout
    }

    fn remaining_budget(&self, viz: &Visualization) -> Duration {
        self.config
            .provision_timeout
            .saturating_sub(self.session_age(viz))
    }

    async fn fail_session(&self, id: &str, expected: VisualizationStatus, cause: String, reason: &str) {
        match self
            .sessions
            .transition(id, expected, |v| v.mark_failed(cause.clone()))
            .await
        {
            Ok(_) => {
                tracing::warn!(session_id = %id, reason, error = %cause, "Visualization failed");
                self.events.publish(
                    LifecycleEvent::new(EVENT_VISUALIZATION_FAILED)
                        .with_source("visualization", id.to_string())
                        .with_payload(serde_json::json!({
                            "error": cause,
                            "reason": reason,
                        })),
                );
            }
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "Failure not recorded");
            }
        }
    }
}
