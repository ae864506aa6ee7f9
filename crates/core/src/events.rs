//! Lifecycle event-type constants.
//!
//! Dot-separated names published on the event bus and echoed verbatim as the
//! `type` field of WebSocket push frames.

/// A simulation record was created (status `pending`).
pub const EVENT_SIMULATION_CREATED: &str = "simulation.created";

/// A simulation was claimed by the dispatcher and its solver launched.
pub const EVENT_SIMULATION_RUNNING: &str = "simulation.running";

/// A simulation's solver finished successfully.
pub const EVENT_SIMULATION_COMPLETED: &str = "simulation.completed";

/// A simulation failed (solver error, crash, or timeout).
pub const EVENT_SIMULATION_FAILED: &str = "simulation.failed";

/// A simulation record was deleted.
pub const EVENT_SIMULATION_DELETED: &str = "simulation.deleted";

/// A visualization session was created (status `pending`).
pub const EVENT_VISUALIZATION_CREATED: &str = "visualization.created";

/// A rendering worker was launched for a visualization session.
pub const EVENT_VISUALIZATION_RUNNING: &str = "visualization.running";

/// A visualization session's worker is ready and its endpoint negotiated.
pub const EVENT_VISUALIZATION_READY: &str = "visualization.ready";

/// A visualization session failed (launch, probe, or timeout).
pub const EVENT_VISUALIZATION_FAILED: &str = "visualization.failed";

/// A visualization session was deleted and its worker torn down.
pub const EVENT_VISUALIZATION_DELETED: &str = "visualization.deleted";
