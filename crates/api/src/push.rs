//! Lifecycle event push.
//!
//! Translates [`LifecycleEvent`]s from the bus into WebSocket frames for
//! connected clients. The frame's `type` field carries the event type
//! verbatim (`simulation.completed`, `visualization.ready`, ...), so a
//! client can stop polling as soon as it sees the transition it waits for.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast;

use simflow_events::LifecycleEvent;

use crate::ws::WsManager;

/// Spawn the event push task.
///
/// Runs until the event bus is dropped (all senders gone).
pub fn start_event_push(
    ws_manager: Arc<WsManager>,
    mut rx: broadcast::Receiver<LifecycleEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    broadcast_event(&ws_manager, &event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Clients fall back to polling; dropped frames are not
                    // a correctness problem.
                    tracing::warn!(skipped, "Event push lagging behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("Event push task stopped");
    })
}

/// Serialize one event and broadcast it to all connected clients.
async fn broadcast_event(ws_manager: &WsManager, event: &LifecycleEvent) {
    let frame = serde_json::json!({
        "type": event.event_type,
        "entity": event.source_entity_type,
        "id": event.source_entity_id,
        "payload": event.payload,
        "timestamp": event.timestamp,
    });
    ws_manager.broadcast(Message::Text(frame.to_string().into())).await;
}
