//! Process-backed solver engine.
//!
//! Shells out to the solver toolchains the way the platform's workload
//! definitions do: a CFD case is a `.tar.gz` archive unpacked and driven by
//! its `Allrun` script, an FEA case is a CalculiX input deck run with `ccx`.
//! Command templates are configurable so deployments can point at their own
//! wrapper scripts.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use simflow_core::simulation::SolverKind;

use crate::error::EngineError;
use crate::solver::{SolveSpec, SolverEngine};

/// Keep at most this much of the solver's stderr as the failure cause.
const STDERR_TAIL_BYTES: usize = 4096;

/// Shell command templates per solver kind.
///
/// `{case_dir}` and `{result_dir}` are replaced with absolute paths before
/// the script is handed to `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct SolverCommands {
    pub cfd: String,
    pub fea: String,
}

impl Default for SolverCommands {
    fn default() -> Self {
        Self {
            cfd: "cd {case_dir} && tar -xzf *.tar.gz && ./Allrun && cp -r postProcessing {result_dir}/"
                .to_string(),
            fea: "cp {case_dir}/input.inp /tmp && cd /tmp && ccx input && cp *.frd *.dat {result_dir}/"
                .to_string(),
        }
    }
}

impl SolverCommands {
    /// Render the script for one spec.
    fn script_for(&self, spec: &SolveSpec) -> String {
        let template = match spec.kind {
            SolverKind::Cfd => &self.cfd,
            SolverKind::Fea => &self.fea,
        };
        template
            .replace("{case_dir}", &spec.case_dir.display().to_string())
            .replace("{result_dir}", &spec.result_dir.display().to_string())
    }
}

/// Runs solvers as local child processes.
pub struct ProcessSolverEngine {
    commands: SolverCommands,
}

impl ProcessSolverEngine {
    pub fn new(commands: SolverCommands) -> Self {
        Self { commands }
    }
}

impl Default for ProcessSolverEngine {
    fn default() -> Self {
        Self::new(SolverCommands::default())
    }
}

#[async_trait]
impl SolverEngine for ProcessSolverEngine {
    async fn run(&self, spec: &SolveSpec, cancel: &CancellationToken) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&spec.result_dir).await?;

        let script = self.commands.script_for(spec);
        tracing::debug!(
            simulation_id = %spec.simulation_id,
            kind = %spec.kind,
            "Launching solver process",
        );

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Launch("solver process", e))?;

        // Collect a stderr tail concurrently so a failure carries a cause.
        let stderr_task = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                let start = buf.len().saturating_sub(STDERR_TAIL_BYTES);
                String::from_utf8_lossy(&buf[start..]).into_owned()
            })
        });

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(simulation_id = %spec.simulation_id, "Killing cancelled solver");
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(EngineError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if status.success() {
            return Ok(());
        }

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        Err(EngineError::SolverFailed {
            exit: status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
