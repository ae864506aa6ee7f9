//! Simulation records and their state machine.
//!
//! A simulation moves along `pending -> running -> {completed | failed}`.
//! The transition helpers here enforce the timestamp invariants; the store
//! applies them under compare-and-set so concurrent completion-reporting and
//! deletion can never both land on the same record.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_entity_id, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a simulation name.
pub const MAX_NAME_LEN: usize = 128;

/// Maximum length of a config path.
pub const MAX_CONFIG_PATH_LEN: usize = 256;

/// Maximum size of an uploaded case archive or input deck.
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Solver kind
// ---------------------------------------------------------------------------

/// Which solver family a simulation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// Computational fluid dynamics (OpenFOAM-style case directory).
    Cfd,
    /// Finite element analysis (CalculiX-style input deck).
    Fea,
}

impl SolverKind {
    /// Parse a wire-format kind string, rejecting anything outside
    /// `{cfd, fea}` with a validation error.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "cfd" => Ok(Self::Cfd),
            "fea" => Ok(Self::Fea),
            other => Err(CoreError::Validation(format!(
                "Invalid simulation type \"{other}\" (expected \"cfd\" or \"fea\")"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cfd => "cfd",
            Self::Fea => "fea",
        }
    }
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Current state of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SimulationStatus {
    /// Terminal records never mutate again except via deletion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A tracked request to run a numerical simulation.
///
/// `id`, `name`, `type`, and `configPath` are immutable after creation.
/// `resultPath` names the artifact set the solver writes; it is assigned at
/// creation so a visualization session can copy it at any point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SolverKind,
    pub config_path: String,
    pub result_path: String,
    pub status: SimulationStatus,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Simulation {
    /// Create a new record in `pending`. Never blocks on execution — the
    /// dispatcher picks the record up asynchronously.
    pub fn new(name: impl Into<String>, kind: SolverKind, config_path: impl Into<String>) -> Self {
        let id = new_entity_id();
        let result_path = format!("results/{id}");
        Self {
            id,
            name: name.into(),
            kind,
            config_path: config_path.into(),
            result_path,
            status: SimulationStatus::Pending,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Create a record whose case directory is keyed by the record's own
    /// id — the storage layout for uploaded-archive inputs.
    pub fn new_from_upload(name: impl Into<String>, kind: SolverKind) -> Self {
        let mut sim = Self::new(name, kind, "");
        sim.config_path = sim.id.clone();
        sim
    }

    /// `pending -> running`; sets `startedAt`.
    pub fn mark_started(&mut self) -> Result<(), CoreError> {
        self.require_status(SimulationStatus::Pending, "start")?;
        self.status = SimulationStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> completed`; sets `completedAt`.
    pub fn mark_completed(&mut self) -> Result<(), CoreError> {
        self.require_status(SimulationStatus::Running, "complete")?;
        self.status = SimulationStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `running -> failed`; records the cause and sets `completedAt`.
    ///
    /// Every failed record must carry a non-empty cause — there is no
    /// silent failure in the contract.
    pub fn mark_failed(&mut self, cause: impl Into<String>) -> Result<(), CoreError> {
        let cause = cause.into();
        if cause.is_empty() {
            return Err(CoreError::Internal(
                "A failed simulation must carry a non-empty cause".to_string(),
            ));
        }
        self.require_status(SimulationStatus::Running, "fail")?;
        self.status = SimulationStatus::Failed;
        self.error = Some(cause);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn require_status(&self, expected: SimulationStatus, action: &str) -> Result<(), CoreError> {
        if self.status != expected {
            return Err(CoreError::Conflict(format!(
                "Cannot {action} simulation {} in status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a user-supplied simulation name.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_NAME_LEN` characters.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Simulation name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Simulation name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate a named config path (a case directory under the data root).
///
/// Rules:
/// - Must not be empty and must not exceed `MAX_CONFIG_PATH_LEN` characters.
/// - Must be relative and must not contain `..` segments.
/// - May only contain alphanumeric, hyphen, underscore, dot, or slash
///   characters.
pub fn validate_config_path(path: &str) -> Result<(), CoreError> {
    if path.is_empty() {
        return Err(CoreError::Validation(
            "Config path must not be empty".to_string(),
        ));
    }
    if path.len() > MAX_CONFIG_PATH_LEN {
        return Err(CoreError::Validation(format!(
            "Config path must not exceed {MAX_CONFIG_PATH_LEN} characters"
        )));
    }
    if path.starts_with('/') {
        return Err(CoreError::Validation(
            "Config path must be relative".to_string(),
        ));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(CoreError::Validation(
            "Config path must not contain \"..\" segments".to_string(),
        ));
    }
    if !path
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(CoreError::Validation(
            "Config path may only contain alphanumeric, hyphen, underscore, dot, or slash characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Validate an uploaded file's name against the solver kind's expected
/// format: CFD takes a `.tar.gz` case archive, FEA a `.inp` input deck.
pub fn validate_upload_filename(kind: SolverKind, filename: &str) -> Result<(), CoreError> {
    match kind {
        SolverKind::Cfd if !filename.ends_with(".tar.gz") => Err(CoreError::Validation(format!(
            "CFD simulation requires a .tar.gz archive, got: {filename}"
        ))),
        SolverKind::Fea if !filename.ends_with(".inp") => Err(CoreError::Validation(format!(
            "FEA simulation requires a .inp input deck, got: {filename}"
        ))),
        _ => Ok(()),
    }
}

/// The filename an upload is stored under inside the case directory.
///
/// FEA decks are normalised to `input.inp` (the solver invocation expects
/// it); CFD archives keep their original name, stripped of any path
/// components.
pub fn upload_dest_filename(kind: SolverKind, original: &str) -> String {
    match kind {
        SolverKind::Fea => "input.inp".to_string(),
        SolverKind::Cfd => original
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(original)
            .to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
