use std::collections::HashMap;

use tokio::sync::RwLock;

use simflow_core::error::CoreError;
use simflow_core::types::EntityId;
use simflow_core::visualization::{Visualization, VisualizationStatus};

/// In-memory store of visualization session records.
///
/// Mirrors [`crate::SimulationStore`]: snapshot reads, compare-and-set
/// writes. The provisioner claims pending sessions through
/// [`transition`](Self::transition) so a session is never provisioned twice.
pub struct VisualizationStore {
    records: RwLock<HashMap<EntityId, Visualization>>,
}

impl VisualizationStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly created record and return a snapshot of it.
    pub async fn create(&self, viz: Visualization) -> Visualization {
        let mut records = self.records.write().await;
        records.insert(viz.id.clone(), viz.clone());
        viz
    }

    /// Point-in-time snapshot of a single record.
    pub async fn get(&self, id: &str) -> Option<Visualization> {
        self.records.read().await.get(id).cloned()
    }

    /// Snapshot of all records, most-recently-created first.
    pub async fn list(&self) -> Vec<Visualization> {
        let mut all: Vec<Visualization> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Snapshot of the sessions referencing one simulation.
    pub async fn list_by_simulation(&self, simulation_id: &str) -> Vec<Visualization> {
        let mut matching: Vec<Visualization> = self
            .records
            .read()
            .await
            .values()
            .filter(|v| v.simulation_id == simulation_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
    }

    /// Snapshot of all `pending` sessions, oldest first — the provisioner's
    /// work queue.
    pub async fn list_pending(&self) -> Vec<Visualization> {
        let mut pending: Vec<Visualization> = self
            .records
            .read()
            .await
            .values()
            .filter(|v| v.status == VisualizationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending
    }

    /// Number of records currently waiting for a rendering slot.
    pub async fn pending_count(&self) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|v| v.status == VisualizationStatus::Pending)
            .count()
    }

    /// Remove a record, returning it if it existed.
    pub async fn remove(&self, id: &str) -> Option<Visualization> {
        self.records.write().await.remove(id)
    }

    /// Apply a state transition under compare-and-set, as in
    /// [`crate::SimulationStore::transition`].
    pub async fn transition<F>(
        &self,
        id: &str,
        expected: VisualizationStatus,
        apply: F,
    ) -> Result<Visualization, CoreError>
    where
        F: FnOnce(&mut Visualization) -> Result<(), CoreError>,
    {
        let mut records = self.records.write().await;
        let viz = records
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Visualization", id))?;

        if viz.status != expected {
            return Err(CoreError::Conflict(format!(
                "Visualization {id} is in status {}, expected {expected}",
                viz.status
            )));
        }

        apply(viz)?;
        Ok(viz.clone())
    }
}

impl Default for VisualizationStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
