/// Errors from the solver and render seams.
///
/// These never reach an API caller directly — the dispatcher and
/// provisioner record them as the failure cause on the affected record.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The external process could not be spawned.
    #[error("Failed to launch {0}: {1}")]
    Launch(&'static str, #[source] std::io::Error),

    /// The solver finished with a non-zero exit status.
    #[error("Solver {exit}: {stderr}")]
    SolverFailed { exit: String, stderr: String },

    /// The run was cancelled (record deleted or shutdown in progress).
    #[error("Cancelled")]
    Cancelled,

    /// The rendering worker stopped before it ever listened.
    #[error("Rendering worker exited before becoming ready: {0}")]
    WorkerExited(String),

    /// A filesystem operation on the case or result directories failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
