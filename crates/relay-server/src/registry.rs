use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use relay_core::{ConnectionId, ProtocolError, ServerEnvelope};

/// A joined peer: identity bound at join time plus the outbound frame queue.
pub struct Peer {
    pub username: String,
    pub joined_at: DateTime<Utc>,
    tx: mpsc::Sender<String>,
}

/// Registry of joined connections: the single source of truth for who is
/// online, and the fan-out point for outbound envelopes.
///
/// All entries live under one RwLock'd map. Mutations return the
/// post-mutation count from inside the same lock acquisition, so a
/// `user_count` computed from a register/unregister can never observe a torn
/// intermediate state. Connections that have not joined are not in here;
/// they only ever receive direct replies through their own queue.
///
/// Identity uniqueness across connections is not enforced: two connections
/// may join under the same display name.
pub struct ConnectionRegistry {
    peers: RwLock<HashMap<ConnectionId, Peer>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Bind an identity to a connection, making it eligible for chat and
    /// counted in presence.
    ///
    /// The username is trimmed before storing; a name that trims to empty is
    /// rejected. Registering an already-registered connection replaces its
    /// entry (a re-join may change identity). Returns the stored username
    /// and the registry size after the insert.
    pub fn register(
        &self,
        conn_id: &ConnectionId,
        username: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<(String, usize), ProtocolError> {
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::InvalidUsername);
        }

        let mut peers = self.peers.write();
        peers.insert(
            conn_id.clone(),
            Peer {
                username: trimmed.to_owned(),
                joined_at: Utc::now(),
                tx,
            },
        );
        Ok((trimmed.to_owned(), peers.len()))
    }

    /// Remove a connection. Returns the removed peer and the remaining count,
    /// or None if it was never registered (double-close is a no-op).
    pub fn unregister(&self, conn_id: &ConnectionId) -> Option<(Peer, usize)> {
        let mut peers = self.peers.write();
        let peer = peers.remove(conn_id)?;
        Some((peer, peers.len()))
    }

    pub fn count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn contains(&self, conn_id: &ConnectionId) -> bool {
        self.peers.read().contains_key(conn_id)
    }

    /// The identity bound to a connection, if it has joined.
    pub fn username_of(&self, conn_id: &ConnectionId) -> Option<String> {
        self.peers.read().get(conn_id).map(|p| p.username.clone())
    }

    /// Display names of everyone online, in no particular order.
    pub fn usernames(&self) -> Vec<String> {
        self.peers
            .read()
            .values()
            .map(|p| p.username.clone())
            .collect()
    }

    /// Fan an envelope out to every registered connection except `exclude`.
    ///
    /// The envelope is serialized once. Delivery is fire-and-forget per
    /// peer: a full or closed queue is logged and skipped, and never stops
    /// delivery to the rest; the affected connection's own socket tasks
    /// will notice closure and clean up. Returns the number of peers the
    /// frame was queued for.
    pub fn broadcast(&self, envelope: &ServerEnvelope, exclude: Option<&ConnectionId>) -> usize {
        let frame = envelope.encode();
        let peers = self.peers.read();
        let mut delivered = 0;

        for (conn_id, peer) in peers.iter() {
            if exclude == Some(conn_id) {
                continue;
            }
            match peer.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        conn_id = %conn_id,
                        username = %peer.username,
                        envelope = envelope.tag(),
                        "send queue full, dropping frame"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(
                        conn_id = %conn_id,
                        username = %peer.username,
                        "peer queue closed, skipping"
                    );
                }
            }
        }

        delivered
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(32)
    }

    #[test]
    fn register_and_unregister_track_count() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.count(), 0);

        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let (tx_a, _rx_a) = peer_channel();
        let (tx_b, _rx_b) = peer_channel();

        let (_, count) = registry.register(&a, "alice", tx_a).unwrap();
        assert_eq!(count, 1);
        let (_, count) = registry.register(&b, "bob", tx_b).unwrap();
        assert_eq!(count, 2);

        let (peer, remaining) = registry.unregister(&a).unwrap();
        assert_eq!(peer.username, "alice");
        assert_eq!(remaining, 1);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unregister_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        assert!(registry.unregister(&id).is_none());

        // Double-close: second unregister after a real one is also a no-op.
        let (tx, _rx) = peer_channel();
        registry.register(&id, "alice", tx).unwrap();
        assert!(registry.unregister(&id).is_some());
        assert!(registry.unregister(&id).is_none());
    }

    #[test]
    fn register_trims_username() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (tx, _rx) = peer_channel();

        let (stored, _) = registry.register(&id, "  bob  ", tx).unwrap();
        assert_eq!(stored, "bob");
        assert_eq!(registry.username_of(&id).as_deref(), Some("bob"));
        assert_eq!(registry.usernames(), vec!["bob".to_string()]);
    }

    #[test]
    fn register_rejects_blank_username() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();

        let (tx, _rx) = peer_channel();
        let err = registry.register(&id, "   ", tx).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidUsername);
        assert_eq!(registry.count(), 0);

        let (tx, _rx) = peer_channel();
        let err = registry.register(&id, "", tx).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidUsername);
    }

    #[test]
    fn rejoin_replaces_entry() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        let (tx1, _rx1) = peer_channel();
        let (tx2, _rx2) = peer_channel();

        registry.register(&id, "alice", tx1).unwrap();
        let (stored, count) = registry.register(&id, "alicia", tx2).unwrap();
        assert_eq!(stored, "alicia");
        assert_eq!(count, 1);
        assert_eq!(registry.username_of(&id).as_deref(), Some("alicia"));
    }

    #[test]
    fn duplicate_display_names_allowed() {
        let registry = ConnectionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let (tx_a, _rx_a) = peer_channel();
        let (tx_b, _rx_b) = peer_channel();

        registry.register(&a, "bob", tx_a).unwrap();
        registry.register(&b, "bob", tx_b).unwrap();
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn broadcast_reaches_all_peers() {
        let registry = ConnectionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let (tx_a, mut rx_a) = peer_channel();
        let (tx_b, mut rx_b) = peer_channel();

        registry.register(&a, "alice", tx_a).unwrap();
        registry.register(&b, "bob", tx_b).unwrap();

        let delivered = registry.broadcast(&ServerEnvelope::UserCount { count: 2 }, None);
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().unwrap().contains("user_count"));
        assert!(rx_b.try_recv().unwrap().contains("user_count"));
    }

    #[test]
    fn broadcast_excludes_one_connection() {
        let registry = ConnectionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let (tx_a, mut rx_a) = peer_channel();
        let (tx_b, mut rx_b) = peer_channel();

        registry.register(&a, "alice", tx_a).unwrap();
        registry.register(&b, "bob", tx_b).unwrap();

        let env = ServerEnvelope::UserJoined {
            username: "bob".into(),
            timestamp: Utc::now().to_rfc3339(),
        };
        let delivered = registry.broadcast(&env, Some(&b));
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_survives_full_queue() {
        let registry = ConnectionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = peer_channel();

        registry.register(&a, "alice", tx_a).unwrap();
        registry.register(&b, "bob", tx_b).unwrap();

        // Fill a's queue so the next frame to it is dropped.
        registry.broadcast(&ServerEnvelope::UserCount { count: 2 }, Some(&b));

        let delivered = registry.broadcast(&ServerEnvelope::UserCount { count: 2 }, None);
        assert_eq!(delivered, 1);
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn broadcast_survives_closed_peer() {
        let registry = ConnectionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let (tx_a, rx_a) = peer_channel();
        let (tx_b, mut rx_b) = peer_channel();

        registry.register(&a, "alice", tx_a).unwrap();
        registry.register(&b, "bob", tx_b).unwrap();
        drop(rx_a);

        let delivered = registry.broadcast(&ServerEnvelope::UserCount { count: 2 }, None);
        assert_eq!(delivered, 1);
        assert!(rx_b.try_recv().is_ok());
    }
}
