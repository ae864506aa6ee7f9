use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simflow_api::config::{OrchestratorConfig, ServerConfig};
use simflow_api::engine::{reconcile, RenderProvisioner, SolverDispatcher};
use simflow_api::push;
use simflow_api::router::build_app_router;
use simflow_api::state::AppState;
use simflow_api::ws;
use simflow_engine::{ProbeConfig, ProcessRenderBackend, ProcessSolverEngine};
use simflow_events::EventBus;
use simflow_store::{SimulationStore, VisualizationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simflow_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let orchestrator = Arc::new(OrchestratorConfig::from_env());
    tracing::info!(
        host = %config.host,
        port = %config.port,
        data_root = %orchestrator.data_root.display(),
        "Loaded server configuration",
    );

    // --- Storage layout ---
    tokio::fs::create_dir_all(orchestrator.data_root.join("simulations"))
        .await
        .context("Failed to create simulations directory")?;
    tokio::fs::create_dir_all(orchestrator.data_root.join("results"))
        .await
        .context("Failed to create results directory")?;

    // --- Stores and event bus ---
    let simulations = Arc::new(SimulationStore::new());
    let visualizations = Arc::new(VisualizationStore::new());
    let event_bus = Arc::new(EventBus::default());

    // --- WebSocket manager, heartbeat, event push ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));
    let push_handle = push::start_event_push(Arc::clone(&ws_manager), event_bus.subscribe());

    // --- External engines ---
    let solver = Arc::new(ProcessSolverEngine::new(orchestrator.solver_commands.clone()));
    let render = Arc::new(ProcessRenderBackend::new(
        orchestrator.render_command.clone(),
        orchestrator.render_host.clone(),
        ProbeConfig::default(),
    ));

    // --- Supervisors ---
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

    let supervisor_cancel = tokio_util::sync::CancellationToken::new();
    let dispatcher_handle = tokio::spawn(Arc::clone(&dispatcher).run(supervisor_cancel.child_token()));
    let provisioner_handle =
        tokio::spawn(Arc::clone(&provisioner).run(supervisor_cancel.child_token()));
    let reconcile_handle = tokio::spawn(reconcile::run(
        Arc::clone(&dispatcher),
        Arc::clone(&provisioner),
        orchestrator.reconcile_interval,
        supervisor_cancel.child_token(),
    ));
    tracing::info!("Supervisors started (dispatcher, provisioner, reconciler)");

    // --- App state and router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator,
        simulations,
        visualizations,
        dispatcher,
        provisioner: Arc::clone(&provisioner),
        event_bus,
        ws_manager: Arc::clone(&ws_manager),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let budget = Duration::from_secs(config.shutdown_timeout_secs);
    supervisor_cancel.cancel();
    let _ = tokio::time::timeout(budget, dispatcher_handle).await;
    let _ = tokio::time::timeout(budget, provisioner_handle).await;
    let _ = tokio::time::timeout(budget, reconcile_handle).await;
    tracing::info!("Supervisors stopped");

    // Tear down rendering workers before dropping the stores that
    // reference them.
    provisioner.shutdown().await;
    tracing::info!("Render provisioner shut down");

    push_handle.abort();
    ws_manager.shutdown_all().await;
    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");

    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
