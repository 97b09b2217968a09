use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CameraTransport, FrameSource, StreamRelease};
use crate::error::{PerceptionError, Result};
use camwatch_common::utils::is_device_path;

/// Live camera transport backed by a GStreamer `appsink` pipeline.
#[derive(Debug, Clone)]
pub struct GstTransport {
    pull_timeout: Duration,
}

impl GstTransport {
    pub fn new(pull_timeout: Duration) -> Self {
        Self { pull_timeout }
    }

    fn pipeline_description(uri: &str) -> String {
        let source = if is_device_path(uri) {
            format!("v4l2src device={}", uri)
        } else {
            format!("uridecodebin uri={}", uri)
        };
        format!(
            "{} ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=1 drop=true",
            source
        )
    }
}

impl Default for GstTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl CameraTransport for GstTransport {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>> {
        gstreamer::init()?;

        let description = Self::pipeline_description(uri);
        info!("Creating GStreamer pipeline: {}", description);
        let pipeline = gstreamer::parse::launch(&description)?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| PerceptionError::transport("Failed to downcast to pipeline"))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| PerceptionError::transport("No appsink element found in pipeline"))?
            .downcast::<AppSink>()
            .map_err(|_| PerceptionError::transport("Failed to downcast to AppSink"))?;

        pipeline.set_state(gstreamer::State::Playing)?;

        Ok(Box::new(GstSource {
            uri: uri.to_string(),
            pipeline: Some(pipeline),
            appsink,
            pull_timeout: self.pull_timeout,
        }))
    }
}

pub struct GstSource {
    uri: String,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: AppSink,
    pull_timeout: Duration,
}

impl GstSource {
    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.as_ref()?.bus()?;
        let message = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
        match message.view() {
            gstreamer::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }
}

impl FrameSource for GstSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.pipeline.is_none() {
            return Err(PerceptionError::transport("pipeline already closed"));
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.pull_timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.appsink.is_eos() {
                return Ok(None);
            }
            return Err(match self.bus_error() {
                Some(reason) => PerceptionError::transport(format!("{}: {}", self.uri, reason)),
                None => PerceptionError::Timeout(format!(
                    "{}: no sample within {:?}",
                    self.uri, self.pull_timeout
                )),
            });
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| PerceptionError::transport("Failed to get buffer"))?;
        let caps = sample
            .caps()
            .ok_or_else(|| PerceptionError::transport("Failed to get caps"))?;
        let info = VideoInfo::from_caps(caps)?;
        let map = buffer.map_readable()?;

        let width = info.width();
        let height = info.height();
        let stride = info.stride()[0] as usize;
        let row_bytes = width as usize * 3;
        let data = map.as_slice();

        // Rows may be padded; copy only the visible pixels.
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            if row.len() < row_bytes {
                return Err(PerceptionError::transport("short video row"));
            }
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        RgbImage::from_raw(width, height, pixels)
            .map(Some)
            .ok_or_else(|| PerceptionError::transport("frame size mismatch"))
    }

    fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!(uri = %self.uri, "Failed to set pipeline to null state: {}", e);
            }
            debug!(uri = %self.uri, "GStreamer pipeline released");
        }
    }

    fn release_handle(&self) -> Option<Arc<dyn StreamRelease>> {
        let pipeline = self.pipeline.clone()?;
        Some(Arc::new(GstRelease {
            uri: self.uri.clone(),
            pipeline,
        }))
    }
}

/// Drops the pipeline to Null from the stopping thread, which flushes the
/// appsink and wakes a pending pull.
struct GstRelease {
    uri: String,
    pipeline: gstreamer::Pipeline,
}

impl StreamRelease for GstRelease {
    fn release(&self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!(uri = %self.uri, "Failed to release pipeline: {}", e);
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_pipeline_description() {
        let desc = GstTransport::pipeline_description("/dev/video0");
        assert!(desc.starts_with("v4l2src device=/dev/video0"));
        assert!(desc.contains("appsink name=sink"));

        let desc = GstTransport::pipeline_description("rtsp://10.0.0.2/live");
        assert!(desc.starts_with("uridecodebin uri=rtsp://10.0.0.2/live"));
    }
}
