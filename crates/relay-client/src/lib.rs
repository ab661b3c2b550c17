pub mod client;
pub mod errors;
pub mod fsm;
pub mod mock;
pub mod session;
pub mod transport;

pub use client::{ClientConfig, ClientSnapshot, ReconnectingClient};
pub use errors::ClientError;
pub use fsm::{backoff_delay, ConnState, ReconnectAction, ReconnectFsm, TransportEvent};
pub use session::{EntryKind, SessionEntry, SessionState};
pub use transport::{Connector, SocketEvent, Transport, WsConnector};
