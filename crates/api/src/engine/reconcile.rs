//! Periodic orphan reconciliation.
//!
//! Deletion cancels external work best-effort; a process that cannot be
//! stopped promptly, or a record removed while its supervisor was mid-step,
//! leaves an unreferenced solver run or rendering worker behind. This loop
//! matches live handles against the stores and terminates anything
//! unreferenced, and force-fails records whose supervisor vanished.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::{RenderProvisioner, SolverDispatcher};

/// Run the reconciliation loop.
///
/// Runs until `cancel` is triggered.
pub async fn run(
    dispatcher: Arc<SolverDispatcher>,
    provisioner: Arc<RenderProvisioner>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Reconciliation loop started"
    );
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation loop stopping");
                break;
            }
            _ = ticker.tick() => {
                dispatcher.reconcile().await;
                provisioner.reconcile().await;
            }
        }
    }
}
