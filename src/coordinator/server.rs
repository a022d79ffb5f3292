//! WebSocket endpoint for remote signers

use super::{Outbound, SigningCoordinator};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};

/// Router serving the signer endpoint at `path`
pub fn router(coordinator: SigningCoordinator, path: &str) -> Router {
    Router::new()
        .route(path, get(upgrade_handler))
        .with_state(coordinator)
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(coordinator): State<SigningCoordinator>,
) -> Response {
    if !coordinator.is_running() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Coordinator is stopping").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

/// Pump frames between one socket and the coordinator until either side ends
async fn handle_socket(socket: WebSocket, coordinator: SigningCoordinator) {
    let (connection_id, mut outbound) = coordinator.connect();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader_coordinator = coordinator.clone();
    let reader_id = connection_id.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    reader_coordinator.handle_message(&reader_id, text.as_str())
                }
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => reader_coordinator.handle_message(&reader_id, text),
                    Err(_) => {
                        tracing::warn!(client_id = %reader_id, "Dropping non-UTF-8 binary frame")
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(client_id = %reader_id, "WebSocket read error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    coordinator.disconnect(&connection_id);
}
