//! Lifecycle supervisors.
//!
//! The dispatcher and provisioner are the only components that move records
//! beyond `pending`: each runs a poll loop that claims waiting records under
//! compare-and-set, supervises the external work in a spawned task, and
//! records the terminal outcome. Reconciliation sweeps up whatever
//! best-effort cancellation missed.

pub mod dispatcher;
pub mod provisioner;
pub mod reconcile;

pub use dispatcher::SolverDispatcher;
pub use provisioner::RenderProvisioner;
