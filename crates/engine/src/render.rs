use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use simflow_core::types::EntityId;

use crate::error::EngineError;

/// Everything the render backend needs to boot one worker.
#[derive(Debug, Clone)]
pub struct RenderSpec {
    pub session_id: EntityId,
    /// Workload name recorded on the session as `workerRef`.
    pub worker_name: String,
    /// Absolute path to the artifact set the worker serves.
    pub data_dir: PathBuf,
}

/// A live rendering worker.
///
/// The provisioner holds the handle from launch until the session is
/// deleted (or reconciliation finds the record gone) and must call
/// [`terminate`](Self::terminate) exactly when releasing it.
#[async_trait]
pub trait RenderWorkerHandle: Send {
    /// Opaque name of the underlying workload.
    fn worker_ref(&self) -> &str;

    /// Wait until the worker is listening, then return the negotiated
    /// streaming endpoint (a `ws://` URL unique to this worker).
    ///
    /// The caller bounds this with the session's provisioning budget;
    /// cancellation must abort the wait promptly.
    async fn await_ready(&mut self, cancel: &CancellationToken) -> Result<String, EngineError>;

    /// Tear the worker down and release its resources. Idempotent.
    async fn terminate(&mut self);
}

/// Boots ephemeral rendering workers.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn launch(&self, spec: &RenderSpec)
        -> Result<Box<dyn RenderWorkerHandle>, EngineError>;
}
