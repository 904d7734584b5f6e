//! Web server and WebSocket push of diagnostic snapshots, using axum.

use crate::model::DiagnosticSnapshot;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Html, IntoResponse},
    routing::get,
};
use log::{debug, error, info, trace};
use std::net::SocketAddr;
use tokio::sync::broadcast;

#[derive(Clone)]
pub(super) struct AppState {
    /// Fan-out of snapshots to every connected client.
    pub(super) snapshot_tx: broadcast::Sender<DiagnosticSnapshot>,
}

pub(super) fn router(snapshot_tx: broadcast::Sender<DiagnosticSnapshot>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(websocket_handler))
        .with_state(AppState { snapshot_tx })
}

/// Binds `addr` and serves the monitor until the server fails.
pub(super) async fn start_web_server(
    addr: SocketAddr,
    snapshot_tx: broadcast::Sender<DiagnosticSnapshot>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind web monitor to {}: {}", addr, e);
        e
    })?;
    info!("Web monitor listening on http://{}", addr);
    axum::serve(listener, router(snapshot_tx)).await
}

async fn root_handler() -> impl IntoResponse {
    Html(include_str!("web/monitor.html"))
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forwards every broadcast snapshot to one client as a JSON text message.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("WebSocket client connected.");
    let mut snapshot_rx = state.snapshot_tx.subscribe();

    loop {
        tokio::select! {
            received = snapshot_rx.recv() => match received {
                Ok(snapshot) => {
                    let json = match serde_json::to_string(&snapshot) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize snapshot: {}", e);
                            continue;
                        }
                    };
                    trace!("Sending snapshot ({} bytes) to WebSocket client.", json.len());
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        info!("WebSocket client disconnected (send error).");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("WebSocket client lagging, skipped {} snapshots.", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                    info!("WebSocket client disconnected.");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
