use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// A persisted chat message as it appears on the wire and in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub username: String,
    pub message: String,
    pub timestamp: String,
}

/// Client-to-server envelopes. Two operations only: join, then chat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEnvelope {
    #[serde(rename = "join")]
    Join { username: String },

    #[serde(rename = "chat")]
    Chat { text: String },
}

impl ClientEnvelope {
    /// Decode a raw inbound frame.
    ///
    /// Decoding is two-stage so the error cases stay distinct: JSON that does
    /// not parse, or that carries no string `type`, is a malformed envelope;
    /// a recognized tag with a missing or non-string payload field maps to
    /// that operation's validation error; an unrecognized tag is its own
    /// error. Extra fields are ignored.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidFormat)?;
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::InvalidFormat)?;

        match tag {
            "join" => {
                let username = value
                    .get("username")
                    .and_then(serde_json::Value::as_str)
                    .ok_or(ProtocolError::InvalidUsername)?;
                Ok(Self::Join {
                    username: username.to_owned(),
                })
            }
            "chat" => {
                let text = value
                    .get("text")
                    .and_then(serde_json::Value::as_str)
                    .ok_or(ProtocolError::InvalidText)?;
                Ok(Self::Chat {
                    text: text.to_owned(),
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_owned())),
        }
    }

    /// Serialize for the wire.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Server-to-client envelopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEnvelope {
    /// Bounded replay of recent messages, oldest first. Sent once per join.
    #[serde(rename = "history")]
    History { messages: Vec<StoredMessage> },

    #[serde(rename = "system_message")]
    SystemMessage { message: String, timestamp: String },

    #[serde(rename = "user_joined")]
    UserJoined { username: String, timestamp: String },

    #[serde(rename = "user_left")]
    UserLeft { username: String, timestamp: String },

    #[serde(rename = "user_count")]
    UserCount { count: usize },

    #[serde(rename = "chat")]
    Chat {
        username: String,
        message: String,
        timestamp: String,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEnvelope {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::History { .. } => "history",
            Self::SystemMessage { .. } => "system_message",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::UserCount { .. } => "user_count",
            Self::Chat { .. } => "chat",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize for the wire. Envelope shapes contain nothing that can fail
    /// to serialize, so this is infallible.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"Internal server error"}"#.to_owned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_join() {
        let env = ClientEnvelope::decode(r#"{"type":"join","username":"alice"}"#).unwrap();
        assert_eq!(
            env,
            ClientEnvelope::Join {
                username: "alice".into()
            }
        );
    }

    #[test]
    fn decode_chat() {
        let env = ClientEnvelope::decode(r#"{"type":"chat","text":"hi"}"#).unwrap();
        assert_eq!(env, ClientEnvelope::Chat { text: "hi".into() });
    }

    #[test]
    fn decode_ignores_extra_fields() {
        let env =
            ClientEnvelope::decode(r#"{"type":"chat","text":"hi","username":"ignored"}"#).unwrap();
        assert_eq!(env, ClientEnvelope::Chat { text: "hi".into() });
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let err = ClientEnvelope::decode("not json").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidFormat);
    }

    #[test]
    fn decode_rejects_missing_type() {
        let err = ClientEnvelope::decode(r#"{"username":"alice"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidFormat);

        let err = ClientEnvelope::decode(r#"{"type":42}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidFormat);
    }

    #[test]
    fn decode_unknown_tag_is_not_malformed() {
        let err = ClientEnvelope::decode(r#"{"type":"shrug"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("shrug".into()));
    }

    #[test]
    fn decode_join_without_username() {
        let err = ClientEnvelope::decode(r#"{"type":"join"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidUsername);

        // Wrong type counts as missing, same as the wire contract.
        let err = ClientEnvelope::decode(r#"{"type":"join","username":7}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidUsername);
    }

    #[test]
    fn decode_chat_without_text() {
        let err = ClientEnvelope::decode(r#"{"type":"chat"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidText);
    }

    #[test]
    fn client_envelope_wire_shape() {
        let json = serde_json::to_string(&ClientEnvelope::Join {
            username: "bob".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"join","username":"bob"}"#);
    }

    #[test]
    fn server_envelope_wire_shapes() {
        let chat = ServerEnvelope::Chat {
            username: "alice".into(),
            message: "hi".into(),
            timestamp: "2026-08-07T12:00:00+00:00".into(),
        };
        let json = chat.encode();
        assert!(json.contains(r#""type":"chat""#));
        assert!(json.contains(r#""message":"hi""#));

        let count = ServerEnvelope::UserCount { count: 3 }.encode();
        assert_eq!(count, r#"{"type":"user_count","count":3}"#);

        let err = ServerEnvelope::Error {
            message: "Invalid message format".into(),
        }
        .encode();
        assert_eq!(err, r#"{"type":"error","message":"Invalid message format"}"#);
    }

    #[test]
    fn history_wire_shape() {
        let env = ServerEnvelope::History {
            messages: vec![StoredMessage {
                username: "alice".into(),
                message: "old".into(),
                timestamp: "2026-08-07T11:00:00+00:00".into(),
            }],
        };
        let json = env.encode();
        assert!(json.starts_with(r#"{"type":"history","messages":[{"#));
        assert!(json.contains(r#""username":"alice""#));
    }

    #[test]
    fn server_envelope_roundtrip() {
        let env = ServerEnvelope::UserJoined {
            username: "bob".into(),
            timestamp: "2026-08-07T12:00:00+00:00".into(),
        };
        let parsed: ServerEnvelope = serde_json::from_str(&env.encode()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn tags_match_wire_names() {
        assert_eq!(ServerEnvelope::UserCount { count: 0 }.tag(), "user_count");
        assert_eq!(
            ServerEnvelope::Error { message: "".into() }.tag(),
            "error"
        );
    }
}
