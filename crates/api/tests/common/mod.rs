//! Shared helpers for the API integration tests.
//!
//! Builds the full router + middleware stack with the real stores and
//! supervisors, but scripted solver/render engines so lifecycles are
//! deterministic and fast.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use simflow_api::config::{OrchestratorConfig, ServerConfig};
use simflow_api::engine::{reconcile, RenderProvisioner, SolverDispatcher};
use simflow_api::router::build_app_router;
use simflow_api::state::AppState;
use simflow_api::ws::WsManager;
use simflow_engine::{
    EngineError, RenderBackend, RenderSpec, RenderWorkerHandle, SolveSpec, SolverCommands,
    SolverEngine,
};
use simflow_events::EventBus;
use simflow_store::{SimulationStore, VisualizationStore};

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// Orchestrator tuning scaled down for tests: fast polls, short budgets.
pub fn test_orchestrator(data_root: std::path::PathBuf) -> OrchestratorConfig {
    OrchestratorConfig {
        data_root,
        solver_slots: 2,
        render_slots: 2,
        queue_depth: 32,
        job_timeout: Duration::from_secs(5),
        provision_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(25),
        reconcile_interval: Duration::from_millis(100),
        render_host: "127.0.0.1".to_string(),
        render_command: "true".to_string(),
        solver_commands: SolverCommands::default(),
    }
}

/// A fully wired application over scripted engines.
///
/// The supervisors' loops are cancelled when the value is dropped; the
/// scratch data root lives as long as the app.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub data_root: tempfile::TempDir,
    _supervisors: tokio_util::sync::DropGuard,
}

/// Build the app with default test tuning.
pub fn build_test_app(solver: Arc<dyn SolverEngine>, render: Arc<dyn RenderBackend>) -> TestApp {
    build_test_app_with(solver, render, |_| {})
}

/// Build the app, letting the test tweak the orchestrator tuning first.
pub fn build_test_app_with<F>(
    solver: Arc<dyn SolverEngine>,
    render: Arc<dyn RenderBackend>,
    tweak: F,
) -> TestApp
where
    F: FnOnce(&mut OrchestratorConfig),
{
    let data_root = tempfile::tempdir().expect("tempdir");
    let mut orchestrator = test_orchestrator(data_root.path().to_path_buf());
    tweak(&mut orchestrator);
    let orchestrator = Arc::new(orchestrator);

    let config = test_config();
    let simulations = Arc::new(SimulationStore::new());
    let visualizations = Arc::new(VisualizationStore::new());
    let event_bus = Arc::new(EventBus::default());
    let ws_manager = Arc::new(WsManager::new());

    let dispatcher = SolverDispatcher::new(
        Arc::clone(&simulations),
        solver,
        Arc::clone(&event_bus),
        Arc::clone(&orchestrator),
    );
    let provisioner = RenderProvisioner::new(
        Arc::clone(&visualizations),
        Arc::clone(&simulations),
        render,
        Arc::clone(&event_bus),
        Arc::clone(&orchestrator),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(Arc::clone(&dispatcher).run(cancel.child_token()));
    tokio::spawn(Arc::clone(&provisioner).run(cancel.child_token()));
    tokio::spawn(reconcile::run(
        Arc::clone(&dispatcher),
        Arc::clone(&provisioner),
        orchestrator.reconcile_interval,
        cancel.child_token(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator,
        simulations,
        visualizations,
        dispatcher,
        provisioner,
        event_bus,
        ws_manager,
    };
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        data_root,
        _supervisors: cancel.drop_guard(),
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, path: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

pub async fn post_json(app: &Router, path: &str, body: serde_json::Value) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("response")
}

pub async fn delete(app: &Router, path: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(path)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// Poll a record's snapshot until `data.status` reaches `want`.
///
/// Returns the final `data` value; panics after five seconds.
pub async fn wait_for_status(app: &Router, path: &str, want: &str) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let response = get(app, path).await;
        assert_eq!(response.status(), StatusCode::OK, "polling {path}");
        let json = body_json(response).await;
        if json["data"]["status"] == want {
            return json["data"].clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {path} to reach {want}; last status: {}",
            json["data"]["status"]
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Count simulations per status from the list endpoint.
pub async fn simulation_status_counts(app: &Router) -> (usize, usize, usize, usize) {
    let json = body_json(get(app, "/api/v1/simulations").await).await;
    let list = json["data"].as_array().expect("data should be an array");
    let count = |status: &str| {
        list.iter()
            .filter(|s| s["status"] == status)
            .count()
    };
    (
        count("pending"),
        count("running"),
        count("completed"),
        count("failed"),
    )
}

/// Create a config-path simulation and return its `data` snapshot.
pub async fn create_simulation(app: &Router, name: &str) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/simulations",
        serde_json::json!({"name": name, "type": "cfd", "configPath": "motorBike"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

/// Create a session against a simulation and return its `data` snapshot.
pub async fn create_visualization(app: &Router, simulation_id: &str) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/visualizations",
        serde_json::json!({"simulationId": simulation_id}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Scripted solver engines
// ---------------------------------------------------------------------------

/// Succeeds immediately.
pub struct InstantSolver {
    pub runs: AtomicUsize,
}

impl InstantSolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SolverEngine for InstantSolver {
    async fn run(&self, _spec: &SolveSpec, _cancel: &CancellationToken) -> Result<(), EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes a small artifact tree before succeeding, so result downloads
/// have something to serve.
pub struct WritingSolver;

#[async_trait]
impl SolverEngine for WritingSolver {
    async fn run(&self, spec: &SolveSpec, _cancel: &CancellationToken) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(spec.result_dir.join("postProcessing")).await?;
        tokio::fs::write(spec.result_dir.join("out.vtk"), b"mesh data").await?;
        tokio::fs::write(spec.result_dir.join("postProcessing/forces.dat"), b"0 1 2").await?;
        Ok(())
    }
}

/// Always fails with the given message.
pub struct FailingSolver {
    pub message: String,
}

impl FailingSolver {
    pub fn new(message: &str) -> Arc<Self> {
        Arc::new(Self {
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl SolverEngine for FailingSolver {
    async fn run(&self, _spec: &SolveSpec, _cancel: &CancellationToken) -> Result<(), EngineError> {
        Err(EngineError::SolverFailed {
            exit: "exit status: 1".to_string(),
            stderr: self.message.clone(),
        })
    }
}

/// Blocks every run until the test releases a permit (or the run is
/// cancelled). Lets tests hold simulations in `running` deterministically.
pub struct GatedSolver {
    gate: Semaphore,
    pub started: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl GatedSolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        })
    }

    /// Let `n` blocked runs finish successfully.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl SolverEngine for GatedSolver {
    async fn run(&self, _spec: &SolveSpec, cancel: &CancellationToken) -> Result<(), EngineError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Cancelled)
            }
            permit = self.gate.acquire() => match permit {
                Ok(p) => {
                    p.forget();
                    Ok(())
                }
                Err(_) => Err(EngineError::Cancelled),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted render backend
// ---------------------------------------------------------------------------

/// Hands out mock workers whose readiness is scripted.
pub struct MockRenderBackend {
    ready_after: Option<Duration>,
    pub launches: AtomicUsize,
    pub terminations: Arc<AtomicUsize>,
}

impl MockRenderBackend {
    /// Workers are ready immediately.
    pub fn instant() -> Arc<Self> {
        Arc::new(Self {
            ready_after: Some(Duration::ZERO),
            launches: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Workers become ready after a fixed delay.
    pub fn delayed(ready_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            ready_after: Some(ready_after),
            launches: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Workers never become ready (provisioning must time out).
    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            ready_after: None,
            launches: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl RenderBackend for MockRenderBackend {
    async fn launch(&self, spec: &RenderSpec) -> Result<Box<dyn RenderWorkerHandle>, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockWorker {
            worker_ref: spec.worker_name.clone(),
            endpoint: format!("ws://127.0.0.1:9000/ws/{}", spec.session_id),
            ready_after: self.ready_after,
            terminations: Arc::clone(&self.terminations),
        }))
    }
}

struct MockWorker {
    worker_ref: String,
    endpoint: String,
    ready_after: Option<Duration>,
    terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderWorkerHandle for MockWorker {
    fn worker_ref(&self) -> &str {
        &self.worker_ref
    }

    async fn await_ready(&mut self, cancel: &CancellationToken) -> Result<String, EngineError> {
        match self.ready_after {
            Some(delay) => tokio::select! {
                _ = cancel.cancelled() => Err(EngineError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(self.endpoint.clone()),
            },
            None => {
                cancel.cancelled().await;
                Err(EngineError::Cancelled)
            }
        }
    }

    async fn terminate(&mut self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}
