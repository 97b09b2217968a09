pub mod hub;
pub mod session;
pub mod transport;

pub use hub::{ConnectionHandle, ConnectionHub, ConnectionId};
pub use session::run_session;
pub use transport::{ChannelTransport, ObserverTransport};
