use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl PerceptionError {
    pub fn transport(message: impl Into<String>) -> Self {
        PerceptionError::Transport(message.into())
    }

    pub fn detector(message: impl Into<String>) -> Self {
        PerceptionError::Detector(message.into())
    }
}

#[cfg(feature = "gstreamer")]
impl From<gstreamer::glib::Error> for PerceptionError {
    fn from(error: gstreamer::glib::Error) -> Self {
        PerceptionError::Transport(error.to_string())
    }
}

#[cfg(feature = "gstreamer")]
impl From<gstreamer::glib::BoolError> for PerceptionError {
    fn from(error: gstreamer::glib::BoolError) -> Self {
        PerceptionError::Transport(error.to_string())
    }
}

#[cfg(feature = "gstreamer")]
impl From<gstreamer::StateChangeError> for PerceptionError {
    fn from(error: gstreamer::StateChangeError) -> Self {
        PerceptionError::Transport(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PerceptionError>;
