use std::path::PathBuf;
use std::time::Duration;

use simflow_engine::SolverCommands;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8082`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `8082`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8082".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
        }
    }
}

/// Orchestrator tuning: slots, queue depth, timeouts, storage layout.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Root of the case/result storage tree (default: `./data`).
    pub data_root: PathBuf,
    /// Concurrent solver runs (default: `2`). Excess jobs queue as `pending`.
    pub solver_slots: usize,
    /// Concurrent rendering workers (default: `2`).
    pub render_slots: usize,
    /// Maximum `pending` backlog per resource kind before creates are
    /// rejected (default: `32`).
    pub queue_depth: usize,
    /// Maximum solver run duration before a forced failure (default: 1h).
    pub job_timeout: Duration,
    /// Maximum time from session creation to `ready` before a forced
    /// failure (default: 5m).
    pub provision_timeout: Duration,
    /// Dispatcher/provisioner poll interval (default: 500ms).
    pub poll_interval: Duration,
    /// Orphan reconciliation interval (default: 60s).
    pub reconcile_interval: Duration,
    /// Host rendering workers bind on (default: `127.0.0.1`).
    pub render_host: String,
    /// Shell command template the rendering worker is launched with.
    pub render_command: String,
    /// Shell command templates for the solver kinds.
    pub solver_commands: SolverCommands,
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default       |
    /// |--------------------------|---------------|
    /// | `DATA_ROOT`              | `./data`      |
    /// | `SOLVER_SLOTS`           | `2`           |
    /// | `RENDER_SLOTS`           | `2`           |
    /// | `QUEUE_DEPTH`            | `32`          |
    /// | `JOB_TIMEOUT_SECS`       | `3600`        |
    /// | `PROVISION_TIMEOUT_SECS` | `300`         |
    /// | `DISPATCH_POLL_MS`       | `500`         |
    /// | `RECONCILE_INTERVAL_SECS`| `60`          |
    /// | `RENDER_HOST`            | `127.0.0.1`   |
    ///
    /// `SOLVER_CFD_COMMAND`, `SOLVER_FEA_COMMAND`, and `RENDER_COMMAND`
    /// override the built-in command templates.
    pub fn from_env() -> Self {
        let mut solver_commands = SolverCommands::default();
        if let Ok(cfd) = std::env::var("SOLVER_CFD_COMMAND") {
            solver_commands.cfd = cfd;
        }
        if let Ok(fea) = std::env::var("SOLVER_FEA_COMMAND") {
            solver_commands.fea = fea;
        }

        Self {
            data_root: PathBuf::from(
                std::env::var("DATA_ROOT").unwrap_or_else(|_| "./data".into()),
            ),
            solver_slots: env_parse("SOLVER_SLOTS", 2),
            render_slots: env_parse("RENDER_SLOTS", 2),
            queue_depth: env_parse("QUEUE_DEPTH", 32),
            job_timeout: Duration::from_secs(env_parse("JOB_TIMEOUT_SECS", 3600)),
            provision_timeout: Duration::from_secs(env_parse("PROVISION_TIMEOUT_SECS", 300)),
            poll_interval: Duration::from_millis(env_parse("DISPATCH_POLL_MS", 500)),
            reconcile_interval: Duration::from_secs(env_parse("RECONCILE_INTERVAL_SECS", 60)),
            render_host: std::env::var("RENDER_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            render_command: std::env::var("RENDER_COMMAND").unwrap_or_else(|_| {
                "python -m light_viz.server --port {port} --data {data_dir}".into()
            }),
            solver_commands,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{var} must be valid: {e:?}")),
        Err(_) => default,
    }
}
