use camwatch_perception::PerceptionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Send error: {0}")]
    Send(String),

    #[error("Observer transport closed")]
    TransportClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Perception error: {0}")]
    Perception(#[from] PerceptionError),
}

pub type Result<T> = std::result::Result<T, OperatorError>;
