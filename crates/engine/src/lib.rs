//! Integration with the external compute collaborators.
//!
//! The orchestrator core never performs numerical computation or rendering
//! itself; this crate holds the narrow seams it talks through:
//!
//! - [`SolverEngine`] — runs a simulation's solver to completion
//!   ([`ProcessSolverEngine`] shells out to the OpenFOAM / CalculiX
//!   toolchains).
//! - [`RenderBackend`] / [`RenderWorkerHandle`] — boots and supervises an
//!   ephemeral rendering worker ([`ProcessRenderBackend`] spawns one per
//!   session and probes it until it listens).
//!
//! Both seams are object-safe traits so the API crate's tests can substitute
//! scripted engines.

pub mod error;
pub mod probe;
pub mod process_render;
pub mod process_solver;
pub mod render;
pub mod solver;

pub use error::EngineError;
pub use probe::ProbeConfig;
pub use process_render::ProcessRenderBackend;
pub use process_solver::{ProcessSolverEngine, SolverCommands};
pub use render::{RenderBackend, RenderSpec, RenderWorkerHandle};
pub use solver::{SolveSpec, SolverEngine};
