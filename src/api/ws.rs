//! WebSocket endpoint for observers.
//!
//! Each socket is one gateway connection. Inbound text frames are [`GatewayRequest`]s;
//! every [`TaskEvent`] queued for the connection is written back as a JSON text frame.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};

use crate::api::AppState;
use crate::gateway::{GatewayRequest, SubscriptionGateway};
use crate::types::{ConnectionId, TaskEvent};

/// GET /ws - Upgrade to an observer connection
pub async fn handle_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.gateway))
}

async fn handle_socket(socket: WebSocket, gateway: SubscriptionGateway) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut events) = gateway.connect();

    tracing::info!(%connection, "WebSocket connection established");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if let Err(e) = sender.send(Message::Text(json)).await {
                            tracing::warn!(%connection, error = %e, "Failed to send event");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(%connection, error = %e, "Failed to serialize event");
                    }
                }
            }
            msg = receiver.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!(%connection, error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => handle_text(&gateway, connection, &text).await,
                    Message::Ping(data) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            tracing::warn!(%connection, error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Message::Close(_) => {
                        tracing::debug!(%connection, "WebSocket closed by client");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    gateway.disconnect(connection);
    tracing::info!(%connection, "WebSocket connection terminated");
}

async fn handle_text(gateway: &SubscriptionGateway, connection: ConnectionId, text: &str) {
    let request: GatewayRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(%connection, error = %e, "Malformed gateway request");
            gateway.send_event(
                connection,
                TaskEvent::TaskError {
                    id: String::new(),
                    message: format!("Invalid message format: {e}"),
                },
            );
            return;
        }
    };

    // Rejections are already reported to the connection by the gateway
    let _ = gateway.handle(connection, &request).await;
}
