use std::sync::Arc;

use simflow_events::EventBus;
use simflow_store::{SimulationStore, VisualizationStore};

use crate::config::{OrchestratorConfig, ServerConfig};
use crate::engine::{RenderProvisioner, SolverDispatcher};
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Orchestrator tuning (slots, timeouts, storage layout).
    pub orchestrator: Arc<OrchestratorConfig>,
    /// Source of truth for simulation records.
    pub simulations: Arc<SimulationStore>,
    /// Source of truth for visualization session records.
    pub visualizations: Arc<VisualizationStore>,
    /// Solver execution supervisor (slot accounting, cancellation).
    pub dispatcher: Arc<SolverDispatcher>,
    /// Rendering worker supervisor (slot accounting, teardown).
    pub provisioner: Arc<RenderProvisioner>,
    /// Centralized event bus for publishing lifecycle events.
    pub event_bus: Arc<EventBus>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
}
