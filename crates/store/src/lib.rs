//! Simflow record stores.
//!
//! The [`SimulationStore`] and [`VisualizationStore`] are the only sources
//! of truth for record state. Both are in-memory maps behind a
//! `tokio::sync::RwLock`: reads take a point-in-time snapshot and never wait
//! on a record's transition, writes apply a compare-and-set on the expected
//! prior status so concurrent completion-reporting and deletion cannot both
//! land on the same record.

pub mod simulation_store;
pub mod visualization_store;

pub use simulation_store::SimulationStore;
pub use visualization_store::VisualizationStore;
