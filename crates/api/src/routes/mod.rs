//! Route tree for the orchestrator API.
//!
//! Route hierarchy (all under `/api/v1` except `/health`):
//!
//! ```text
//! /ws                                       WebSocket push channel
//!
//! /simulations                              create (POST), list (GET)
//! /simulations/{simId}                      get, delete
//! /simulations/{simId}/results              result manifest (completed only)
//! /simulations/{simId}/results/{*path}      stream one artifact file
//! /simulations/{simId}/visualizations       sessions for one simulation
//!
//! /visualizations                           create (POST)
//! /visualizations/{vizId}                   get, delete
//! /visualizations/{vizId}/stream-endpoint   negotiated endpoint (ready only)
//! ```

pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use simflow_core::simulation::MAX_UPLOAD_BYTES;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Slack on top of the upload cap for the surrounding multipart framing.
const UPLOAD_BODY_SLACK: u64 = 1024 * 1024;

/// Build the `/api/v1` route tree.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/simulations", simulation_routes())
        .nest("/visualizations", visualization_routes())
}

fn simulation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::simulations::create_simulation)
                .get(handlers::simulations::list_simulations),
        )
        .route(
            "/{sim_id}",
            get(handlers::simulations::get_simulation)
                .delete(handlers::simulations::delete_simulation),
        )
        .route("/{sim_id}/results", get(handlers::simulations::get_results))
        .route(
            "/{sim_id}/results/{*path}",
            get(handlers::simulations::download_result_file),
        )
        .route(
            "/{sim_id}/visualizations",
            get(handlers::visualizations::list_by_simulation),
        )
        // Case archives are capped at MAX_UPLOAD_BYTES; the default axum
        // body limit is far below that.
        .layer(DefaultBodyLimit::max((MAX_UPLOAD_BYTES + UPLOAD_BODY_SLACK) as usize))
}

fn visualization_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::visualizations::create_visualization))
        .route(
            "/{viz_id}",
            get(handlers::visualizations::get_visualization)
                .delete(handlers::visualizations::delete_visualization),
        )
        .route(
            "/{viz_id}/stream-endpoint",
            get(handlers::visualizations::get_stream_endpoint),
        )
}
