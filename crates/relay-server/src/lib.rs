pub mod registry;
pub mod room;
pub mod server;

pub use registry::ConnectionRegistry;
pub use room::{ChatRoom, ConnectionEvent};
pub use server::{start, ServerConfig, ServerHandle};
