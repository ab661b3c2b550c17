use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use relay_core::ConnectionId;
use relay_store::{Database, MessageRepo};

use crate::registry::ConnectionRegistry;
use crate::room::{ChatRoom, ConnectionEvent};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_send_queue: 256,
            history_limit: 50,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub room: Arc<ChatRoom>,
    pub max_send_queue: usize,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/chat/info", get(chat_info_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ConnectionRegistry::new());
    let messages = Arc::new(MessageRepo::new(db));
    let room = Arc::new(ChatRoom::new(registry, messages, config.history_limit));

    let state = AppState {
        room,
        max_send_queue: config.max_send_queue,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "relay server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()`. Dropping it does not stop the server,
/// but it carries the bound port for callers that asked for port 0.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection: writer drains the outbound queue, reader
/// feeds the room, and the close event runs exactly once when either side
/// finishes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<String>(state.max_send_queue);
    let room = state.room;

    room.handle_event(&conn_id, &tx, ConnectionEvent::Open).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued frames to the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader task: translate socket messages into connection events, one at
    // a time so a connection's frames are handled in arrival order.
    let reader_room = Arc::clone(&room);
    let reader_conn = conn_id.clone();
    let reader_tx = tx.clone();
    let reader = tokio::spawn(async move {
        loop {
            match ws_rx.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    reader_room
                        .handle_event(
                            &reader_conn,
                            &reader_tx,
                            ConnectionEvent::Frame(text.to_string()),
                        )
                        .await;
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    reader_room
                        .handle_event(
                            &reader_conn,
                            &reader_tx,
                            ConnectionEvent::Error(err.to_string()),
                        )
                        .await;
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    room.handle_event(&conn_id, &tx, ConnectionEvent::Close).await;
}

/// Health check HTTP endpoint.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "OK",
        "message": "Server is healthy",
    }))
}

/// Presence snapshot sourced from the registry.
async fn chat_info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.room.registry();
    axum::Json(serde_json::json!({
        "connectedUsers": registry.count(),
        "usernames": registry.usernames(),
    }))
}
