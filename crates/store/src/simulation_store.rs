use std::collections::HashMap;

use tokio::sync::RwLock;

use simflow_core::error::CoreError;
use simflow_core::simulation::{Simulation, SimulationStatus};
use simflow_core::types::EntityId;

/// In-memory store of simulation records.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between the API handlers, the dispatcher, and the reconciler.
pub struct SimulationStore {
    records: RwLock<HashMap<EntityId, Simulation>>,
}

impl SimulationStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly created record and return a snapshot of it.
    pub async fn create(&self, sim: Simulation) -> Simulation {
        let mut records = self.records.write().await;
        records.insert(sim.id.clone(), sim.clone());
        sim
    }

    /// Point-in-time snapshot of a single record.
    pub async fn get(&self, id: &str) -> Option<Simulation> {
        self.records.read().await.get(id).cloned()
    }

    /// Snapshot of all records, most-recently-created first.
    pub async fn list(&self) -> Vec<Simulation> {
        let mut all: Vec<Simulation> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Number of records currently waiting for a solver slot.
    ///
    /// Used by the create path to enforce the queue-depth cap.
    pub async fn pending_count(&self) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|s| s.status == SimulationStatus::Pending)
            .count()
    }

    /// Remove a record, returning it if it existed.
    pub async fn remove(&self, id: &str) -> Option<Simulation> {
        self.records.write().await.remove(id)
    }

    /// Apply a state transition under compare-and-set.
    ///
    /// Fails with `NotFound` if the record no longer exists (e.g. deleted
    /// while its solver was finishing) and `Conflict` if the record is not
    /// in `expected` status. The closure performs the actual transition and
    /// may itself reject it.
    pub async fn transition<F>(
        &self,
        id: &str,
        expected: SimulationStatus,
        apply: F,
    ) -> Result<Simulation, CoreError>
    where
        F: FnOnce(&mut Simulation) -> Result<(), CoreError>,
    {
        let mut records = self.records.write().await;
        let sim = records
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Simulation", id))?;

        if sim.status != expected {
            return Err(CoreError::Conflict(format!(
                "Simulation {id} is in status {}, expected {expected}",
                sim.status
            )));
        }

        apply(sim)?;
        Ok(sim.clone())
    }

    /// Claim the oldest `pending` record for execution, transitioning it to
    /// `running` atomically.
    ///
    /// Returns `None` when nothing is waiting. A record deleted between
    /// ticks is simply never observed here — the dispatcher can never start
    /// a deleted record.
    pub async fn claim_next_pending(&self) -> Option<Simulation> {
        let mut records = self.records.write().await;

        let next_id = records
            .values()
            .filter(|s| s.status == SimulationStatus::Pending)
            .min_by_key(|s| s.created_at)
            .map(|s| s.id.clone())?;

        let sim = records.get_mut(&next_id)?;
        if sim.mark_started().is_err() {
            // Lost a race within the same lock scope; cannot happen, but
            // claiming nothing is always safe.
            return None;
        }
        Some(sim.clone())
    }
}

impl Default for SimulationStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use simflow_core::simulation::SolverKind;

    fn sim(name: &str) -> Simulation {
        Simulation::new(name, SolverKind::Cfd, "motorBike")
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let store = SimulationStore::new();
        let created = store.create(sim("a")).await;

        let fetched = store.get(&created.id).await.expect("record should exist");
        assert_eq!(fetched.name, "a");
        assert_eq!(fetched.status, SimulationStatus::Pending);
    }

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let store = SimulationStore::new();
        assert!(store.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let store = SimulationStore::new();
        let mut older = sim("older");
        older.created_at -= chrono::Duration::seconds(10);
        store.create(older).await;
        let newer = store.create(sim("newer")).await;

        let all = store.list().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newer.id);
    }

    #[tokio::test]
    async fn claim_takes_oldest_pending_and_marks_running() {
        let store = SimulationStore::new();
        let mut first = sim("first");
        first.created_at -= chrono::Duration::seconds(10);
        let first = store.create(first).await;
        store.create(sim("second")).await;

        let claimed = store.claim_next_pending().await.expect("should claim");
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, SimulationStatus::Running);
        assert!(claimed.started_at.is_some());

        // The stored record reflects the claim.
        let stored = store.get(&first.id).await.unwrap();
        assert_eq!(stored.status, SimulationStatus::Running);
    }

    #[tokio::test]
    async fn claim_on_empty_store_returns_none() {
        let store = SimulationStore::new();
        assert!(store.claim_next_pending().await.is_none());
    }

    #[tokio::test]
    async fn transition_cas_rejects_wrong_prior_status() {
        let store = SimulationStore::new();
        let created = store.create(sim("a")).await;

        // Record is pending; completing from "running" must conflict.
        let err = store
            .transition(&created.id, SimulationStatus::Running, |s| {
                s.mark_completed()
            })
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
    }

    #[tokio::test]
    async fn transition_on_removed_record_is_not_found() {
        let store = SimulationStore::new();
        let created = store.create(sim("a")).await;
        store.remove(&created.id).await;

        let err = store
            .transition(&created.id, SimulationStatus::Running, |s| {
                s.mark_completed()
            })
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::NotFound { .. });
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = SimulationStore::new();
        let created = store.create(sim("a")).await;
        assert!(store.remove(&created.id).await.is_some());
        assert!(store.remove(&created.id).await.is_none());
    }

    #[tokio::test]
    async fn pending_count_tracks_claims() {
        let store = SimulationStore::new();
        store.create(sim("a")).await;
        store.create(sim("b")).await;
        assert_eq!(store.pending_count().await, 2);

        store.claim_next_pending().await.unwrap();
        assert_eq!(store.pending_count().await, 1);
    }
}
