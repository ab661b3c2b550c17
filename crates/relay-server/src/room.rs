use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relay_core::{ClientEnvelope, ConnectionId, ProtocolError, ServerEnvelope};
use relay_store::MessageRepo;

use crate::registry::ConnectionRegistry;

/// A transport-level event for one connection. The socket layer translates
/// whatever its library reports into one of these; the room is the single
/// switch over them.
#[derive(Debug)]
pub enum ConnectionEvent {
    Open,
    Frame(String),
    Close,
    Error(String),
}

/// The protocol dispatcher for the one shared room.
///
/// Per-connection state is two-valued, unjoined or joined, and lives
/// entirely in the registry: a connection is joined iff it has an entry.
/// Store calls run on the blocking pool so one connection's pending write
/// never stalls another connection's dispatch.
pub struct ChatRoom {
    registry: Arc<ConnectionRegistry>,
    messages: Arc<MessageRepo>,
    history_limit: usize,
}

impl ChatRoom {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        messages: Arc<MessageRepo>,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            messages,
            history_limit,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Single entry point for all connection events, invoked by the socket
    /// layer. Events for one connection arrive in order; `tx` is that
    /// connection's outbound queue for direct replies.
    pub async fn handle_event(
        &self,
        conn_id: &ConnectionId,
        tx: &mpsc::Sender<String>,
        event: ConnectionEvent,
    ) {
        match event {
            ConnectionEvent::Open => {
                debug!(conn_id = %conn_id, "connection opened");
            }
            ConnectionEvent::Frame(raw) => match ClientEnvelope::decode(&raw) {
                Ok(ClientEnvelope::Join { username }) => {
                    self.handle_join(conn_id, tx, &username).await;
                }
                Ok(ClientEnvelope::Chat { text }) => {
                    self.handle_chat(conn_id, tx, &text).await;
                }
                Err(err) => {
                    debug!(conn_id = %conn_id, kind = err.error_kind(), "rejected frame");
                    self.reply(tx, &err.to_envelope()).await;
                }
            },
            ConnectionEvent::Close => {
                self.handle_close(conn_id);
            }
            ConnectionEvent::Error(detail) => {
                // Cleanup happens on the Close that follows.
                warn!(conn_id = %conn_id, error = %detail, "transport error");
            }
        }
    }

    async fn handle_join(&self, conn_id: &ConnectionId, tx: &mpsc::Sender<String>, username: &str) {
        let (username, count) = match self.registry.register(conn_id, username, tx.clone()) {
            Ok(registered) => registered,
            Err(err) => {
                self.reply(tx, &err.to_envelope()).await;
                return;
            }
        };

        // History replay. A store failure degrades to an empty history: the
        // join itself has already happened and must stay visible to others.
        let repo = self.messages.clone();
        let limit = self.history_limit;
        let history = match tokio::task::spawn_blocking(move || repo.recent(limit)).await {
            Ok(Ok(messages)) => messages,
            Ok(Err(err)) => {
                warn!(conn_id = %conn_id, error = %err, "history fetch failed");
                Vec::new()
            }
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err, "history task failed");
                Vec::new()
            }
        };

        self.reply(tx, &ServerEnvelope::History { messages: history }).await;
        self.reply(
            tx,
            &ServerEnvelope::SystemMessage {
                message: format!("Welcome to the chat room, {username}!"),
                timestamp: Utc::now().to_rfc3339(),
            },
        )
        .await;
        self.reply(tx, &ServerEnvelope::UserCount { count }).await;

        // Everyone else learns about the join; the joiner already got its
        // welcome. The count goes to everyone, joiner included.
        self.registry.broadcast(
            &ServerEnvelope::UserJoined {
                username: username.clone(),
                timestamp: Utc::now().to_rfc3339(),
            },
            Some(conn_id),
        );
        self.registry.broadcast(
            &ServerEnvelope::UserCount {
                count: self.registry.count(),
            },
            None,
        );

        info!(conn_id = %conn_id, username = %username, "client joined");
    }

    async fn handle_chat(&self, conn_id: &ConnectionId, tx: &mpsc::Sender<String>, text: &str) {
        let Some(username) = self.registry.username_of(conn_id) else {
            self.reply(tx, &ProtocolError::NotJoined.to_envelope()).await;
            return;
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.reply(tx, &ProtocolError::InvalidText.to_envelope()).await;
            return;
        }

        let repo = self.messages.clone();
        let author = username.clone();
        let body = trimmed.to_owned();
        let stored = match tokio::task::spawn_blocking(move || repo.append(&author, &body)).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(err)) => {
                warn!(conn_id = %conn_id, username = %username, error = %err, "failed to persist message");
                self.reply(tx, &ProtocolError::Storage.to_envelope()).await;
                return;
            }
            Err(err) => {
                warn!(conn_id = %conn_id, username = %username, error = %err, "persist task failed");
                self.reply(tx, &ProtocolError::Storage.to_envelope()).await;
                return;
            }
        };

        // Sender included: the echo carries the stored timestamp and gives
        // every client the same append-order view.
        self.registry.broadcast(
            &ServerEnvelope::Chat {
                username: stored.username,
                message: stored.message,
                timestamp: stored.timestamp,
            },
            None,
        );

        debug!(conn_id = %conn_id, username = %username, "chat message relayed");
    }

    fn handle_close(&self, conn_id: &ConnectionId) {
        let Some((peer, remaining)) = self.registry.unregister(conn_id) else {
            debug!(conn_id = %conn_id, "unjoined connection closed");
            return;
        };

        // Count first, then the departure notice. Clients rely on this order.
        self.registry
            .broadcast(&ServerEnvelope::UserCount { count: remaining }, None);
        self.registry.broadcast(
            &ServerEnvelope::UserLeft {
                username: peer.username.clone(),
                timestamp: Utc::now().to_rfc3339(),
            },
            None,
        );

        info!(conn_id = %conn_id, username = %peer.username, "client disconnected");
    }

    async fn reply(&self, tx: &mpsc::Sender<String>, envelope: &ServerEnvelope) {
        if tx.send(envelope.encode()).await.is_err() {
            debug!(envelope = envelope.tag(), "reply dropped, connection gone");
        }
    }
}
