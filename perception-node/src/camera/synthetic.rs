//! Generated test-pattern streams for `sim://` cameras.
//!
//! URI form: `sim://<name>?fps=<n>&frames=<n>&width=<px>&height=<px>`.
//! `fps` paces reads like a live stream would; `frames` makes the stream
//! finite. Everything is optional.

use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{CameraTransport, FrameSource, StreamRelease};
use crate::error::{PerceptionError, Result};

pub const SCHEME: &str = "sim://";

/// Longest nap while pacing, so a release is noticed quickly.
const PACE_SLICE: Duration = Duration::from_millis(20);
/// Slowest stream a `sim://` camera may ask for.
const MAX_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticParams {
    pub name: String,
    pub fps: Option<f64>,
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl SyntheticParams {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| PerceptionError::transport(format!("not a synthetic uri: {}", uri)))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut params = Self {
            name: name.to_string(),
            fps: None,
            frames: None,
            width: 320,
            height: 240,
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let bad = || PerceptionError::transport(format!("bad value for {} in {}", key, uri));
            match key {
                "fps" => params.fps = Some(value.parse().map_err(|_| bad())?),
                "frames" => params.frames = Some(value.parse().map_err(|_| bad())?),
                "width" => params.width = value.parse().map_err(|_| bad())?,
                "height" => params.height = value.parse().map_err(|_| bad())?,
                other => warn!(uri, param = other, "Ignoring unknown synthetic stream parameter"),
            }
        }

        if let Some(fps) = params.fps {
            if !fps.is_finite() || fps < 0.0 || (fps > 0.0 && frame_period(fps).is_none()) {
                return Err(PerceptionError::transport(format!("unusable fps {} in {}", fps, uri)));
            }
        }
        if params.width == 0 || params.height == 0 {
            return Err(PerceptionError::transport(format!(
                "synthetic frame size must be non-zero: {}",
                uri
            )));
        }
        Ok(params)
    }

    /// Time between paced frames; `None` reads as fast as asked.
    pub fn period(&self) -> Option<Duration> {
        self.fps.filter(|fps| *fps > 0.0).and_then(frame_period)
    }
}

fn frame_period(fps: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|period| *period <= MAX_PERIOD)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticTransport;

impl CameraTransport for SyntheticTransport {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>> {
        let params = SyntheticParams::parse(uri)?;
        debug!(name = %params.name, fps = ?params.fps, frames = ?params.frames, "Opened synthetic stream");
        Ok(Box::new(SyntheticSource::new(params)))
    }
}

pub struct SyntheticSource {
    params: SyntheticParams,
    produced: u64,
    next_due: Option<Instant>,
    closed: Arc<AtomicBool>,
}

impl SyntheticSource {
    pub fn new(params: SyntheticParams) -> Self {
        Self {
            params,
            produced: 0,
            next_due: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn pace(&mut self) {
        let Some(period) = self.params.period() else {
            return;
        };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        loop {
            let now = Instant::now();
            if due <= now || self.is_closed() {
                break;
            }
            thread::sleep((due - now).min(PACE_SLICE));
        }
        self.next_due = Some(due.max(now) + period);
    }

    fn render(&self) -> RgbImage {
        // Cycle the fill colour so consecutive frames differ.
        let shade = (self.produced % 256) as u8;
        RgbImage::from_pixel(self.params.width, self.params.height, Rgb([shade, 255 - shade, 128]))
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.is_closed() {
            return Err(PerceptionError::transport("synthetic stream closed"));
        }
        if self.params.frames.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }

        self.pace();
        if self.is_closed() {
            return Err(PerceptionError::transport("synthetic stream closed"));
        }
        let image = self.render();
        self.produced += 1;
        Ok(Some(image))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }

    fn release_handle(&self) -> Option<Arc<dyn StreamRelease>> {
        Some(Arc::new(SyntheticRelease(self.closed.clone())))
    }
}

struct SyntheticRelease(Arc<AtomicBool>);

impl StreamRelease for SyntheticRelease {
    fn release(&self) {
        self.0.store(true, Ordering::Release);
    }
}
