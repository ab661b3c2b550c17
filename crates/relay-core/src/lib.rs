pub mod envelope;
pub mod errors;
pub mod ids;

pub use envelope::{ClientEnvelope, ServerEnvelope, StoredMessage};
pub use errors::ProtocolError;
pub use ids::ConnectionId;
