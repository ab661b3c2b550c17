use crate::envelope::ServerEnvelope;

/// Protocol-level failures reported back to the offending sender.
///
/// None of these are fatal to the connection: the dispatcher replies with an
/// `error` envelope and leaves connection state untouched.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope")]
    InvalidFormat,

    #[error("missing or empty username")]
    InvalidUsername,

    #[error("missing or empty message text")]
    InvalidText,

    #[error("chat before join")]
    NotJoined,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("storage failure")]
    Storage,
}

impl ProtocolError {
    /// The exact message text sent to the client. Part of the wire contract.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "Invalid message format",
            Self::InvalidUsername => "Invalid username",
            Self::InvalidText => "Invalid message text",
            Self::NotJoined => "You must join first",
            Self::UnknownType(_) => "Unknown message type",
            Self::Storage => "Failed to send message",
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::InvalidUsername => "invalid_username",
            Self::InvalidText => "invalid_text",
            Self::NotJoined => "not_joined",
            Self::UnknownType(_) => "unknown_type",
            Self::Storage => "storage",
        }
    }

    pub fn to_envelope(&self) -> ServerEnvelope {
        ServerEnvelope::Error {
            message: self.user_message().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_match_wire_contract() {
        assert_eq!(
            ProtocolError::InvalidFormat.user_message(),
            "Invalid message format"
        );
        assert_eq!(ProtocolError::InvalidUsername.user_message(), "Invalid username");
        assert_eq!(ProtocolError::InvalidText.user_message(), "Invalid message text");
        assert_eq!(ProtocolError::NotJoined.user_message(), "You must join first");
        assert_eq!(
            ProtocolError::UnknownType("ping".into()).user_message(),
            "Unknown message type"
        );
        assert_eq!(ProtocolError::Storage.user_message(), "Failed to send message");
    }

    #[test]
    fn to_envelope_wraps_user_message() {
        let env = ProtocolError::NotJoined.to_envelope();
        assert_eq!(
            env,
            ServerEnvelope::Error {
                message: "You must join first".into()
            }
        );
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ProtocolError::InvalidFormat.error_kind(), "invalid_format");
        assert_eq!(ProtocolError::UnknownType("x".into()).error_kind(), "unknown_type");
        assert_eq!(ProtocolError::Storage.error_kind(), "storage");
    }
}
