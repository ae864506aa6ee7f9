//! Handlers for the `/simulations` resource.
//!
//! Create accepts either a JSON body naming a config path or a multipart
//! upload carrying the case archive — both end in the same `pending` record.
//! Everything past validation and record creation happens asynchronously;
//! clients observe progress by polling (or the push channel).

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use simflow_core::error::CoreError;
use simflow_core::events::{EVENT_SIMULATION_CREATED, EVENT_SIMULATION_DELETED};
use simflow_core::simulation::{
    self, Simulation, SimulationStatus, SolverKind, MAX_UPLOAD_BYTES,
};
use simflow_events::LifecycleEvent;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::storage;

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// JSON create body (config-path input).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSimulationRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config_path: Option<String>,
}

/// POST /api/v1/simulations
///
/// Submit a new simulation. JSON bodies name a config path; multipart
/// bodies upload the case file. Returns 201 with the created record in
/// `pending` — the dispatcher picks it up asynchronously.
pub async fn create_simulation(
    State(state): State<AppState>,
    req: Request,
) -> AppResult<impl IntoResponse> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let sim = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to parse form: {e}")))?;
        create_from_upload(&state, multipart).await?
    } else {
        let Json(body) = Json::<CreateSimulationRequest>::from_request(req, &())
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;
        create_from_config(&state, body).await?
    };

    tracing::info!(
        simulation_id = %sim.id,
        name = %sim.name,
        kind = %sim.kind,
        "Simulation submitted",
    );
    state.event_bus.publish(
        LifecycleEvent::new(EVENT_SIMULATION_CREATED)
            .with_source("simulation", sim.id.clone())
            .with_payload(serde_json::json!({
                "name": sim.name,
                "type": sim.kind,
            })),
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: sim })))
}

/// Config-path create: the case directory already exists under the data
/// root (e.g. a named tutorial case).
async fn create_from_config(
    state: &AppState,
    body: CreateSimulationRequest,
) -> AppResult<Simulation> {
    simulation::validate_name(&body.name)?;
    let kind = SolverKind::parse(&body.kind)?;

    let config_path = body
        .config_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            CoreError::Validation(
                "An input is required: provide configPath or upload a file".to_string(),
            )
        })?;
    simulation::validate_config_path(&config_path)?;

    ensure_queue_capacity(state).await?;

    let sim = Simulation::new(body.name, kind, config_path);
    Ok(state.simulations.create(sim).await)
}

/// Multipart create: save the uploaded case file under a directory keyed
/// by the new record's id.
async fn create_from_upload(state: &AppState, mut multipart: Multipart) -> AppResult<Simulation> {
    let mut name: Option<String> = None;
    let mut kind_raw: Option<String> = None;
    let mut file: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {e}")))?
    {
        match field.name().unwrap_or("") {
            "name" => {
                name = Some(field.text().await.map_err(bad_field)?);
            }
            "type" => {
                kind_raw = Some(field.text().await.map_err(bad_field)?);
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| CoreError::Validation("File field must carry a filename".to_string()))?;
                let bytes = field.bytes().await.map_err(bad_field)?;
                file = Some((filename, bytes));
            }
            _ => {}
        }
    }

    let name =
        name.ok_or_else(|| CoreError::Validation("Form field \"name\" is required".to_string()))?;
    let kind_raw =
        kind_raw.ok_or_else(|| CoreError::Validation("Form field \"type\" is required".to_string()))?;
    let (filename, bytes) =
        file.ok_or_else(|| CoreError::Validation("Form field \"file\" is required".to_string()))?;

    simulation::validate_name(&name)?;
    let kind = SolverKind::parse(&kind_raw)?;
    simulation::validate_upload_filename(kind, &filename)?;
    if bytes.len() as u64 > MAX_UPLOAD_BYTES {
        return Err(CoreError::Validation(format!(
            "Uploaded file too large: {} bytes (max {MAX_UPLOAD_BYTES})",
            bytes.len()
        ))
        .into());
    }

    ensure_queue_capacity(state).await?;

    let sim = Simulation::new_from_upload(name, kind);
    let dest = simulation::upload_dest_filename(kind, &filename);
    storage::save_upload(&state.orchestrator.data_root, &sim.config_path, &dest, &bytes)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to save upload: {e}")))?;

    Ok(state.simulations.create(sim).await)
}

fn bad_field(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Failed to read form field: {e}"))
}

/// The queue-depth cap: beyond it, creates are rejected synchronously
/// instead of queueing.
async fn ensure_queue_capacity(state: &AppState) -> Result<(), AppError> {
    let pending = state.simulations.pending_count().await;
    if pending >= state.orchestrator.queue_depth {
        return Err(CoreError::ResourceExhausted(format!(
            "Simulation queue is full ({pending} pending)"
        ))
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/simulations
///
/// List all simulations, most-recently-created first.
pub async fn list_simulations(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let sims = state.simulations.list().await;
    Ok(Json(DataResponse { data: sims }))
}

/// GET /api/v1/simulations/{simId}
pub async fn get_simulation(
    State(state): State<AppState>,
    Path(sim_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let sim = state
        .simulations
        .get(&sim_id)
        .await
        .ok_or_else(|| CoreError::not_found("Simulation", sim_id))?;
    Ok(Json(DataResponse { data: sim }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/simulations/{simId}
///
/// Removes the record in any state. A running solver is cancelled
/// best-effort first; reconciliation cleans up anything that slips through.
pub async fn delete_simulation(
    State(state): State<AppState>,
    Path(sim_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    if state.simulations.get(&sim_id).await.is_none() {
        return Err(CoreError::not_found("Simulation", sim_id).into());
    }

    // Signal before removing so the solver sees the cancellation while the
    // record still exists.
    state.dispatcher.cancel(&sim_id).await;
    state.simulations.remove(&sim_id).await;
    // A dispatch claim may have landed between the first signal and the
    // removal; a second signal closes that window.
    state.dispatcher.cancel(&sim_id).await;

    tracing::info!(simulation_id = %sim_id, "Simulation deleted");
    state.event_bus.publish(
        LifecycleEvent::new(EVENT_SIMULATION_DELETED).with_source("simulation", sim_id.clone()),
    );

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// GET /api/v1/simulations/{simId}/results
///
/// Manifest of the artifact set; only available once the simulation has
/// completed.
pub async fn get_results(
    State(state): State<AppState>,
    Path(sim_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let sim = require_completed(&state, &sim_id).await?;

    let manifest = storage::result_manifest(&state.orchestrator.data_root, &sim.result_path)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::Core(CoreError::not_found("Results", sim_id.clone()))
            }
            _ => AppError::InternalError(format!("Failed to read results: {e}")),
        })?;

    Ok(Json(DataResponse { data: manifest }))
}

/// GET /api/v1/simulations/{simId}/results/{*path}
///
/// Stream one artifact file as a download.
pub async fn download_result_file(
    State(state): State<AppState>,
    Path((sim_id, rel_path)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let sim = require_completed(&state, &sim_id).await?;

    let abs = storage::resolve_result_file(&state.orchestrator.data_root, &sim.result_path, &rel_path)?;
    let file = tokio::fs::File::open(&abs).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            AppError::Core(CoreError::not_found("Result file", rel_path.clone()))
        }
        _ => AppError::InternalError(format!("Failed to open result file: {e}")),
    })?;

    let filename = rel_path.rsplit('/').next().unwrap_or(&rel_path);
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| AppError::InternalError(format!("Invalid filename header: {e}")))?;

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

async fn require_completed(state: &AppState, sim_id: &str) -> AppResult<Simulation> {
    let sim = state
        .simulations
        .get(sim_id)
        .await
        .ok_or_else(|| CoreError::not_found("Simulation", sim_id.to_string()))?;

    if sim.status != SimulationStatus::Completed {
        return Err(CoreError::NotReady(format!(
            "Results not available while simulation is {}",
            sim.status
        ))
        .into());
    }
    Ok(sim)
}
