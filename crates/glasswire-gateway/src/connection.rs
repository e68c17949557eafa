//! Relay WebSocket lifecycle: register, read/write loops, cleanup.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use glasswire_core::protocol::{RelayEvent, RelayRequest};

use crate::session::{RelayFlavor, RelaySession};
use crate::state::GatewayState;

/// Drive one relay client until it disconnects.
///
/// Requests are handled one at a time; a prompt sent while another is
/// still streaming waits for the first to reach its terminal event.
pub async fn handle_relay_connection(state: Arc<GatewayState>, ws: WebSocket, flavor: RelayFlavor) {
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, flavor = flavor.as_str(), "Relay client connected");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RelayEvent>();

    state.registry.register(&session_id, flavor).await;

    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!(%e, "Failed to encode relay event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = RelaySession::new(session_id.clone(), flavor, state.backends.clone());

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let request = match serde_json::from_str::<RelayRequest>(text.as_str()) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(session_id = %session_id, %e, "Invalid relay request");
                        if event_tx
                            .send(RelayEvent::error(format!("Invalid request: {e}")))
                            .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                };
                if session.handle(request, &event_tx).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(session_id = %session_id, "Client requested close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, %e, "WebSocket error");
                break;
            }
            // Axum answers pings itself; binary frames carry nothing for us.
            _ => {}
        }
    }

    // Let queued events flush before tearing the writer down.
    drop(event_tx);
    let _ = send_task.await;
    state.registry.unregister(&session_id).await;
    info!(session_id = %session_id, "Relay client disconnected");
}
