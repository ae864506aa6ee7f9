//! Process-backed render backend.
//!
//! Spawns one rendering worker process per visualization session on a
//! freshly allocated local port, then probes its HTTP side with exponential
//! backoff until it answers. Any HTTP response counts as "listening" — the
//! probe only has to establish that the socket is being served; the client
//! speaks WebSocket to the `/ws` path of the same port.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::probe::{next_delay, ProbeConfig};
use crate::render::{RenderBackend, RenderSpec, RenderWorkerHandle};

/// Per-request timeout for a single readiness probe.
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Boots rendering workers as local child processes.
///
/// The command template receives `{port}` and `{data_dir}`; the default
/// matches the ParaView-Web style server the platform's worker image runs.
pub struct ProcessRenderBackend {
    command: String,
    host: String,
    probe: ProbeConfig,
    client: reqwest::Client,
}

impl ProcessRenderBackend {
    pub fn new(command: impl Into<String>, host: impl Into<String>, probe: ProbeConfig) -> Self {
        Self {
            command: command.into(),
            host: host.into(),
            probe,
            client: reqwest::Client::new(),
        }
    }

    /// Ask the kernel for a free local port.
    async fn allocate_port(&self) -> Result<u16, EngineError> {
        let listener = tokio::net::TcpListener::bind((self.host.as_str(), 0))
            .await
            .map_err(|e| EngineError::Launch("port allocation", e))?;
        let port = listener
            .local_addr()
            .map_err(|e| EngineError::Launch("port allocation", e))?
            .port();
        // The listener is dropped here; the worker binds the port itself.
        Ok(port)
    }
}

impl Default for ProcessRenderBackend {
    fn default() -> Self {
        Self::new(
            "python -m light_viz.server --port {port} --data {data_dir}",
            "127.0.0.1",
            ProbeConfig::default(),
        )
    }
}

#[async_trait]
impl RenderBackend for ProcessRenderBackend {
    async fn launch(&self, spec: &RenderSpec) -> Result<Box<dyn RenderWorkerHandle>, EngineError> {
        let port = self.allocate_port().await?;

        let script = self
            .command
            .replace("{port}", &port.to_string())
            .replace("{data_dir}", &spec.data_dir.display().to_string());

        tracing::debug!(
            session_id = %spec.session_id,
            worker = %spec.worker_name,
            port,
            "Launching rendering worker",
        );

        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Launch("rendering worker", e))?;

        Ok(Box::new(ProcessRenderWorker {
            worker_ref: spec.worker_name.clone(),
            probe_url: format!("http://{}:{port}/", self.host),
            endpoint: format!("ws://{}:{port}/ws", self.host),
            probe: self.probe.clone(),
            client: self.client.clone(),
            child,
        }))
    }
}

/// A rendering worker running as a local child process.
struct ProcessRenderWorker {
    worker_ref: String,
    probe_url: String,
    endpoint: String,
    probe: ProbeConfig,
    client: reqwest::Client,
    child: Child,
}

#[async_trait]
impl RenderWorkerHandle for ProcessRenderWorker {
    fn worker_ref(&self) -> &str {
        &self.worker_ref
    }

    async fn await_ready(&mut self, cancel: &CancellationToken) -> Result<String, EngineError> {
        let mut delay = self.probe.initial_delay;

        loop {
            // A worker that died will never answer; report it instead of
            // probing until the budget runs out.
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(EngineError::WorkerExited(status.to_string()));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            let probe = self
                .client
                .get(&self.probe_url)
                .timeout(PROBE_REQUEST_TIMEOUT)
                .send()
                .await;

            // Any HTTP response means the socket is served.
            if probe.is_ok() {
                tracing::debug!(worker = %self.worker_ref, "Rendering worker is listening");
                return Ok(self.endpoint.clone());
            }

            delay = next_delay(delay, &self.probe);
        }
    }

    async fn terminate(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        tracing::debug!(worker = %self.worker_ref, "Rendering worker terminated");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use simflow_core::types::new_entity_id;

    fn backend_with(command: &str) -> ProcessRenderBackend {
        ProcessRenderBackend::new(
            command,
            "127.0.0.1",
            ProbeConfig {
                initial_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(100),
                multiplier: 2.0,
            },
        )
    }

    fn spec() -> RenderSpec {
        let id = new_entity_id();
        RenderSpec {
            worker_name: format!("viz-{id}"),
            session_id: id,
            data_dir: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn launch_records_worker_ref_and_port() {
        let backend = backend_with("sleep 30");
        let spec = spec();
        let mut handle = backend.launch(&spec).await.expect("launch should succeed");

        assert_eq!(handle.worker_ref(), spec.worker_name);
        handle.terminate().await;
    }

    #[tokio::test]
    async fn dead_worker_is_reported_not_probed_forever() {
        let backend = backend_with("exit 7");
        let mut handle = backend.launch(&spec()).await.unwrap();

        // Give the child a moment to exit.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = handle
            .await_ready(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkerExited(_)));
        handle.terminate().await;
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let backend = backend_with("sleep 30");
        let mut handle = backend.launch(&spec()).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = handle.await_ready(&cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        handle.terminate().await;
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let backend = backend_with("sleep 30");
        let mut handle = backend.launch(&spec()).await.unwrap();
        handle.terminate().await;
        handle.terminate().await;
    }
}
