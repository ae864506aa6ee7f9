use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use simflow_core::simulation::SolverKind;
use simflow_core::types::EntityId;

use crate::error::EngineError;

/// Everything a solver engine needs to execute one simulation.
#[derive(Debug, Clone)]
pub struct SolveSpec {
    pub simulation_id: EntityId,
    pub kind: SolverKind,
    /// Absolute path to the case directory (uploaded archive or named case).
    pub case_dir: PathBuf,
    /// Absolute path the solver must write its artifacts into.
    pub result_dir: PathBuf,
}

/// Executes a simulation's solver to completion.
///
/// The dispatcher owns the lifecycle around a run — claiming the record,
/// enforcing the run timeout, and recording the outcome. An engine only has
/// to run the work and honour cancellation by terminating it and returning
/// [`EngineError::Cancelled`].
#[async_trait]
pub trait SolverEngine: Send + Sync {
    async fn run(&self, spec: &SolveSpec, cancel: &CancellationToken) -> Result<(), EngineError>;
}
