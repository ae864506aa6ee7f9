//! Visualization session records and their state machine.
//!
//! A session moves along `pending -> running -> {ready | failed}`. A session
//! that cannot start provisioning (its simulation never completes, or a slot
//! never frees in time) fails straight from `pending` — the provisioning
//! timeout guarantees no record hangs forever.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_entity_id, EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Current state of a visualization session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationStatus {
    Pending,
    Running,
    Ready,
    Failed,
}

impl VisualizationStatus {
    /// A session does not leave `ready` or `failed` once it gets there.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for VisualizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A tracked request for an ephemeral visualization of a simulation's
/// output.
///
/// `resultPath` is the session's own copy of the artifact location, taken at
/// creation time — deleting the simulation afterwards does not corrupt an
/// in-flight session. `streamEndpoint` is set exactly once, on first entry
/// to `ready`, and never changes for the life of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    pub id: EntityId,
    pub simulation_id: EntityId,
    pub status: VisualizationStatus,
    pub result_path: String,
    pub worker_ref: Option<String>,
    pub stream_endpoint: Option<String>,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

impl Visualization {
    /// Create a new session in `pending`. Provisioning happens
    /// asynchronously.
    pub fn new(simulation_id: impl Into<EntityId>, result_path: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            simulation_id: simulation_id.into(),
            status: VisualizationStatus::Pending,
            result_path: result_path.into(),
            worker_ref: None,
            stream_endpoint: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// `pending -> running`, recording the provisioned worker's handle.
    pub fn mark_provisioning(&mut self, worker_ref: impl Into<String>) -> Result<(), CoreError> {
        if self.status != VisualizationStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Cannot provision visualization {} in status {}",
                self.id, self.status
            )));
        }
        self.status = VisualizationStatus::Running;
        self.worker_ref = Some(worker_ref.into());
        Ok(())
    }

    /// `running -> ready`, setting the streaming endpoint exactly once.
    pub fn mark_ready(&mut self, endpoint: impl Into<String>) -> Result<(), CoreError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(CoreError::Internal(
                "A ready visualization must carry a non-empty endpoint".to_string(),
            ));
        }
        if self.status != VisualizationStatus::Running {
            return Err(CoreError::Conflict(format!(
                "Cannot mark visualization {} ready in status {}",
                self.id, self.status
            )));
        }
        if self.stream_endpoint.is_some() {
            return Err(CoreError::Conflict(format!(
                "Visualization {} already has a streaming endpoint",
                self.id
            )));
        }
        self.status = VisualizationStatus::Ready;
        self.stream_endpoint = Some(endpoint);
        Ok(())
    }

    /// `pending | running -> failed`, recording a non-empty cause.
    pub fn mark_failed(&mut self, cause: impl Into<String>) -> Result<(), CoreError> {
        let cause = cause.into();
        if cause.is_empty() {
            return Err(CoreError::Internal(
                "A failed visualization must carry a non-empty cause".to_string(),
            ));
        }
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Cannot fail visualization {} in terminal status {}",
                self.id, self.status
            )));
        }
        self.status = VisualizationStatus::Failed;
        self.error = Some(cause);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn new_viz() -> Visualization {
        Visualization::new("abc12345", "results/abc12345")
    }

    #[test]
    fn new_session_is_pending_without_endpoint() {
        let viz = new_viz();
        assert_eq!(viz.status, VisualizationStatus::Pending);
        assert!(viz.worker_ref.is_none());
        assert!(viz.stream_endpoint.is_none());
    }

    #[test]
    fn full_happy_path() {
        let mut viz = new_viz();
        viz.mark_provisioning("viz-worker-1").unwrap();
        assert_eq!(viz.status, VisualizationStatus::Running);
        assert_eq!(viz.worker_ref.as_deref(), Some("viz-worker-1"));
        assert!(viz.stream_endpoint.is_none());

        viz.mark_ready("ws://10.0.0.4:9000/ws").unwrap();
        assert_eq!(viz.status, VisualizationStatus::Ready);
        assert_eq!(viz.stream_endpoint.as_deref(), Some("ws://10.0.0.4:9000/ws"));
    }

    #[test]
    fn endpoint_only_when_ready_and_immutable() {
        let mut viz = new_viz();
        // Not reachable from pending.
        assert!(viz.mark_ready("ws://x/ws").is_err());

        viz.mark_provisioning("w").unwrap();
        viz.mark_ready("ws://a/ws").unwrap();
        // Terminal: no further transitions, endpoint never changes.
        assert!(viz.mark_ready("ws://b/ws").is_err());
        assert!(viz.mark_failed("late").is_err());
        assert_eq!(viz.stream_endpoint.as_deref(), Some("ws://a/ws"));
    }

    #[test]
    fn can_fail_straight_from_pending() {
        let mut viz = new_viz();
        viz.mark_failed("simulation never completed").unwrap();
        assert_eq!(viz.status, VisualizationStatus::Failed);
        assert!(viz.error.is_some());
    }

    #[test]
    fn can_fail_from_running() {
        let mut viz = new_viz();
        viz.mark_provisioning("w").unwrap();
        viz.mark_failed("worker crashed").unwrap();
        assert_eq!(viz.status, VisualizationStatus::Failed);
        assert!(viz.stream_endpoint.is_none());
    }

    #[test]
    fn failed_is_terminal() {
        let mut viz = new_viz();
        viz.mark_failed("timeout").unwrap();
        assert!(viz.mark_provisioning("w").is_err());
        assert!(viz.mark_failed("again").is_err());
    }

    #[test]
    fn empty_endpoint_rejected() {
        let mut viz = new_viz();
        viz.mark_provisioning("w").unwrap();
        assert!(viz.mark_ready("").is_err());
    }

    #[test]
    fn wire_format_is_camel_case() {
        let viz = new_viz();
        let json = serde_json::to_value(&viz).unwrap();
        assert_eq!(json["simulationId"], "abc12345");
        assert!(json["streamEndpoint"].is_null());
        assert!(json.get("workerRef").is_some());
    }
}
