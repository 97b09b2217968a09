//! Operator side of the camera monitoring service: owns the pipeline
//! registry for this node and pushes what it sees to live observers.

pub mod config;
pub mod context;
pub mod error;
pub mod realtime;

pub use config::OperatorConfig;
pub use context::{AppContext, EventRepository, LoggingRepository};
pub use error::{OperatorError, Result};
pub use realtime::{run_session, ChannelTransport, ConnectionHandle, ConnectionHub, ObserverTransport};
