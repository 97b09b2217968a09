use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;

use crate::error::{PerceptionError, Result};

pub mod buffer;
#[cfg(feature = "gstreamer")]
pub mod gstreamer_camera;
pub mod synthetic;

pub use buffer::FrameBuffer;
pub use synthetic::SyntheticTransport;

/// Decoded frame as it sits in a pipeline's buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera_id: String,
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
    pub sequence_num: u64,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub type SharedFrame = Arc<Frame>;

/// Frees an open stream from outside the thread reading it. A read blocked
/// on the stream returns promptly once this has run.
pub trait StreamRelease: Send + Sync {
    fn release(&self);
}

/// An open camera stream, owned by the capture loop that opened it.
pub trait FrameSource: Send {
    /// Blocks until the next frame is decoded. `Ok(None)` marks a clean end
    /// of stream; an error halts capture for this pipeline.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;

    fn close(&mut self);

    /// Handle a stopping pipeline uses to free the stream without waiting
    /// for the reader. `None` when there is nothing worth releasing early.
    fn release_handle(&self) -> Option<Arc<dyn StreamRelease>> {
        None
    }
}

pub trait CameraTransport: Send + Sync {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>>;
}

/// Sends `sim://` URIs to the synthetic generator and everything else to
/// the live transport, if one is configured.
pub struct RoutingTransport {
    synthetic: SyntheticTransport,
    live: Option<Arc<dyn CameraTransport>>,
}

impl RoutingTransport {
    pub fn new(live: Option<Arc<dyn CameraTransport>>) -> Self {
        Self {
            synthetic: SyntheticTransport,
            live,
        }
    }

    /// The GStreamer transport when compiled in, otherwise synthetic only.
    pub fn with_default_live() -> Self {
        #[cfg(feature = "gstreamer")]
        {
            Self::new(Some(Arc::new(gstreamer_camera::GstTransport::default())))
        }
        #[cfg(not(feature = "gstreamer"))]
        {
            Self::new(None)
        }
    }
}

impl CameraTransport for RoutingTransport {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>> {
        if uri.starts_with(synthetic::SCHEME) {
            return self.synthetic.open(uri);
        }
        match &self.live {
            Some(live) => live.open(uri),
            None => Err(PerceptionError::transport(format!(
                "no live transport available for {}",
                uri
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_without_live_transport() {
        let transport = RoutingTransport::new(None);
        assert!(transport.open("sim://dock?frames=1").is_ok());
        assert!(matches!(
            transport.open("rtsp://10.0.0.9/live"),
            Err(PerceptionError::Transport(_))
        ));
    }
}
