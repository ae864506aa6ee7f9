//! Simflow domain core.
//!
//! Pure types and rules shared by every other crate: the simulation and
//! visualization records, their state machines, input validation, the error
//! taxonomy, and the lifecycle event-type constants. No IO, no async — this
//! crate must stay dependency-light so the store, engine, and API crates can
//! all build on it.

pub mod error;
pub mod events;
pub mod simulation;
pub mod types;
pub mod visualization;

pub use error::CoreError;
