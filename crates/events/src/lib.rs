//! Simflow event bus.
//!
//! In-process publish/subscribe hub for lifecycle events:
//!
//! - [`EventBus`] — fan-out hub backed by `tokio::sync::broadcast`.
//! - [`LifecycleEvent`] — the canonical event envelope published on every
//!   simulation and visualization state transition.

pub mod bus;

pub use bus::{EventBus, LifecycleEvent};
