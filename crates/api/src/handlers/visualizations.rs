//! Handlers for the `/visualizations` resource.
//!
//! A session references a simulation and carries its own copy of the
//! result path, taken at creation. The streaming endpoint is a distinct
//! read that only answers once the session is `ready` — earlier calls get
//! an explicit not-yet-available signal so the caller retries.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use simflow_core::error::CoreError;
use simflow_core::events::{EVENT_VISUALIZATION_CREATED, EVENT_VISUALIZATION_DELETED};
use simflow_core::visualization::{Visualization, VisualizationStatus};
use simflow_events::LifecycleEvent;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVisualizationRequest {
    pub simulation_id: String,
    /// Defaults to the referenced simulation's `resultPath`.
    pub result_path: Option<String>,
}

/// POST /api/v1/visualizations
///
/// Request a visualization session against a simulation's output. Returns
/// 201 with the record in `pending`; provisioning happens asynchronously.
pub async fn create_visualization(
    State(state): State<AppState>,
    Json(body): Json<CreateVisualizationRequest>,
) -> AppResult<impl IntoResponse> {
    let sim = state
        .simulations
        .get(&body.simulation_id)
        .await
        .ok_or_else(|| CoreError::not_found("Simulation", body.simulation_id.clone()))?;

    let result_path = body
        .result_path
        .filter(|p| !p.is_empty())
        .unwrap_or(sim.result_path);

    let pending = state.visualizations.pending_count().await;
    if pending >= state.orchestrator.queue_depth {
        return Err(CoreError::ResourceExhausted(format!(
            "Visualization queue is full ({pending} pending)"
        ))
        .into());
    }

    let viz = state
        .visualizations
        .create(Visualization::new(sim.id.clone(), result_path))
        .await;

    tracing::info!(
        session_id = %viz.id,
        simulation_id = %sim.id,
        "Visualization session requested",
    );
    state.event_bus.publish(
        LifecycleEvent::new(EVENT_VISUALIZATION_CREATED)
            .with_source("visualization", viz.id.clone())
            .with_payload(serde_json::json!({
                "simulationId": sim.id,
            })),
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: viz })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/visualizations/{vizId}
pub async fn get_visualization(
    State(state): State<AppState>,
    Path(viz_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let viz = state
        .visualizations
        .get(&viz_id)
        .await
        .ok_or_else(|| CoreError::not_found("Visualization", viz_id))?;
    Ok(Json(DataResponse { data: viz }))
}

/// GET /api/v1/simulations/{simId}/visualizations
///
/// Sessions referencing one simulation. Sessions outlive simulation
/// deletion, so this does not require the simulation to still exist.
pub async fn list_by_simulation(
    State(state): State<AppState>,
    Path(sim_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let sessions = state.visualizations.list_by_simulation(&sim_id).await;
    Ok(Json(DataResponse { data: sessions }))
}

// ---------------------------------------------------------------------------
// Streaming endpoint
// ---------------------------------------------------------------------------

/// GET /api/v1/visualizations/{vizId}/stream-endpoint
///
/// Returns the negotiated endpoint once the session is `ready`. Before
/// that it signals not-yet-available — never an empty placeholder.
pub async fn get_stream_endpoint(
    State(state): State<AppState>,
    Path(viz_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let viz = state
        .visualizations
        .get(&viz_id)
        .await
        .ok_or_else(|| CoreError::not_found("Visualization", viz_id))?;

    match (viz.status, viz.stream_endpoint) {
        (VisualizationStatus::Ready, Some(endpoint)) => Ok(Json(DataResponse {
            data: serde_json::json!({ "streamEndpoint": endpoint }),
        })),
        (status, _) => Err(AppError::Core(CoreError::NotReady(format!(
            "Visualization not ready, current status: {status}"
        )))),
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/visualizations/{vizId}
///
/// Tears down the rendering worker (if any) regardless of state, then
/// removes the record.
pub async fn delete_visualization(
    State(state): State<AppState>,
    Path(viz_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    if state.visualizations.get(&viz_id).await.is_none() {
        return Err(CoreError::not_found("Visualization", viz_id).into());
    }

    state.provisioner.teardown(&viz_id).await;
    state.visualizations.remove(&viz_id).await;

    tracing::info!(session_id = %viz_id, "Visualization deleted");
    state.event_bus.publish(
        LifecycleEvent::new(EVENT_VISUALIZATION_DELETED)
            .with_source("visualization", viz_id.clone()),
    );

    Ok(StatusCode::NO_CONTENT)
}
