use relay_core::ServerEnvelope;

/// How an entry in the local message log renders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Chat,
    System,
    Error,
}

/// One line in the local message log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEntry {
    pub kind: EntryKind,
    pub username: Option<String>,
    pub message: String,
    pub timestamp: Option<String>,
}

/// Observable session state, updated from inbound envelopes.
///
/// `history` replaces the log wholesale; everything else appends in arrival
/// order. `user_count` replaces the count. The membership flags are set by
/// the driver when a join is actually sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    pub in_room: bool,
    pub username: Option<String>,
    pub user_count: usize,
    pub messages: Vec<SessionEntry>,
}

impl SessionState {
    /// Classify and apply one inbound envelope.
    pub fn apply(&mut self, envelope: ServerEnvelope) {
        match envelope {
            ServerEnvelope::History { messages } => {
                self.messages = messages
                    .into_iter()
                    .map(|m| SessionEntry {
                        kind: EntryKind::Chat,
                        username: Some(m.username),
                        message: m.message,
                        timestamp: Some(m.timestamp),
                    })
                    .collect();
            }
            ServerEnvelope::SystemMessage { message, timestamp } => {
                self.messages.push(SessionEntry {
                    kind: EntryKind::System,
                    username: None,
                    message,
                    timestamp: Some(timestamp),
                });
            }
            ServerEnvelope::UserJoined {
                username,
                timestamp,
            } => {
                self.messages.push(SessionEntry {
                    kind: EntryKind::System,
                    username: None,
                    message: format!("{username} joined the room"),
                    timestamp: Some(timestamp),
                });
            }
            ServerEnvelope::UserLeft {
                username,
                timestamp,
            } => {
                self.messages.push(SessionEntry {
                    kind: EntryKind::System,
                    username: None,
                    message: format!("{username} left the room"),
                    timestamp: Some(timestamp),
                });
            }
            ServerEnvelope::UserCount { count } => {
                self.user_count = count;
            }
            ServerEnvelope::Chat {
                username,
                message,
                timestamp,
            } => {
                self.messages.push(SessionEntry {
                    kind: EntryKind::Chat,
                    username: Some(username),
                    message,
                    timestamp: Some(timestamp),
                });
            }
            ServerEnvelope::Error { message } => {
                self.messages.push(SessionEntry {
                    kind: EntryKind::Error,
                    username: None,
                    message,
                    timestamp: None,
                });
            }
        }
    }

    /// Wipe everything back to a fresh, disconnected session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
