//! WebSocket subscription endpoint.
//!
//! `GET /ws/aqi` streams every update; `GET /ws/aqi/{location_id}` only the
//! updates for one location. Each envelope goes out as one JSON text frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use super::AppState;
use crate::notify::Subscription;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/ws/aqi", get(all_locations))
        .route("/ws/aqi/{location_id}", get(one_location))
}

async fn all_locations(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let subscription = state.pipeline.notifier().subscribe(None);
    ws.on_upgrade(move |socket| handle_socket(socket, subscription))
}

async fn one_location(
    ws: WebSocketUpgrade,
    Path(location_id): Path<Uuid>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let subscription = state.pipeline.notifier().subscribe(Some(location_id));
    ws.on_upgrade(move |socket| handle_socket(socket, subscription))
}

/// Forward envelopes to the socket until either side goes away.
///
/// The subscription is taken before the upgrade completes so no update
/// published in between is missed.
async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    // ---
    let conn_id = Uuid::new_v4();
    tracing::info!(%conn_id, "Subscriber connected");

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(envelope) = subscription.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(%conn_id, error = %e, "Failed to encode envelope");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                tracing::debug!(%conn_id, "Subscriber sink closed");
                break;
            }
        }
    });

    // Inbound frames carry no commands; only watch for close.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "Subscriber receive error");
                break;
            }
        }
    }

    send_task.abort();
    tracing::info!(%conn_id, "Subscriber disconnected");
}
