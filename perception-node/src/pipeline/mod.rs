//! Per-camera capture + detection pipeline.
//!
//! A running pipeline owns exactly two threads: a capture loop that reads
//! the camera stream into a bounded [`FrameBuffer`], and a detection loop
//! that samples that buffer at a throttled cadence and pushes events into
//! the sink. Both loops are tied to a generation number; `stop` (or
//! dropping the pipeline) retires the generation and the loops exit on
//! their next poll. Stopping also releases the open stream so a capture
//! thread blocked in a read lets go of the camera straight away.

use camwatch_common::{utils::format_duration, CameraConfig, IdentityRecord};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::camera::{CameraTransport, FrameBuffer, SharedFrame, StreamRelease};
use crate::config::{DetectionSettings, PipelineSettings};
use crate::detection::DetectorSet;
use crate::error::Result;
use crate::events::EventSink;

pub mod registry;
mod worker;

pub use registry::PipelineRegistry;

const JOIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Running,
}

#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    detection_runs: AtomicU64,
    samples_skipped: AtomicU64,
    detector_failures: AtomicU64,
    events_emitted: AtomicU64,
}

impl PipelineStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            detection_runs: self.detection_runs.load(Ordering::Relaxed),
            samples_skipped: self.samples_skipped.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub detection_runs: u64,
    pub samples_skipped: u64,
    pub detector_failures: u64,
    pub events_emitted: u64,
}

/// Collaborators shared by every pipeline a registry builds.
#[derive(Clone)]
pub struct PipelineDeps {
    pub transport: Arc<dyn CameraTransport>,
    pub sink: Arc<dyn EventSink>,
    pub settings: PipelineSettings,
    pub detection: Arc<DetectionSettings>,
}

impl PipelineDeps {
    pub fn new(transport: Arc<dyn CameraTransport>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            sink,
            settings: PipelineSettings::default(),
            detection: Arc::new(DetectionSettings::default()),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_detection(mut self, detection: DetectionSettings) -> Self {
        self.detection = Arc::new(detection);
        self
    }
}

/// State the loops read. Never mutated after construction except through
/// atomics and the latest-frame slot.
pub(crate) struct Shared {
    pub(crate) config: CameraConfig,
    pub(crate) deps: PipelineDeps,
    pub(crate) detectors: DetectorSet,
    pub(crate) buffer: FrameBuffer,
    pub(crate) latest: Mutex<Option<SharedFrame>>,
    pub(crate) generation: AtomicU64,
    pub(crate) stats: PipelineStats,
    /// Release handle of the stream the capture loop has open, tagged with
    /// its generation.
    pub(crate) release: Mutex<Option<(u64, Arc<dyn StreamRelease>)>>,
}

impl Shared {
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Park the release handle for `generation`. Returns `false` when that
    /// generation was already retired, in which case nothing is parked and
    /// the caller must close the stream itself.
    pub(crate) fn park_release(&self, generation: u64, handle: Option<Arc<dyn StreamRelease>>) -> bool {
        let mut slot = self.release.lock();
        if !self.is_current(generation) {
            return false;
        }
        *slot = handle.map(|handle| (generation, handle));
        true
    }

    pub(crate) fn take_release(&self, generation: u64) -> Option<Arc<dyn StreamRelease>> {
        let mut slot = self.release.lock();
        match slot.take() {
            Some((parked, handle)) if parked == generation => Some(handle),
            other => {
                *slot = other;
                None
            }
        }
    }
}

struct Workers {
    generation: u64,
    capture: JoinHandle<()>,
    detect: JoinHandle<()>,
}

impl Workers {
    fn join(self, camera_id: &str, deadline: Instant) {
        join_until(self.capture, camera_id, "capture", deadline);
        join_until(self.detect, camera_id, "detection", deadline);
    }
}

fn join_until(handle: JoinHandle<()>, camera_id: &str, role: &str, deadline: Instant) {
    // A sink that stops its own camera would otherwise wait on itself.
    if handle.thread().id() == thread::current().id() {
        return;
    }
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(camera_id, "{} loop did not exit in time, detaching", role);
            return;
        }
        thread::sleep(JOIN_POLL);
    }
    if handle.join().is_err() {
        error!(camera_id, "{} loop panicked", role);
    }
}

pub struct CameraPipeline {
    shared: Arc<Shared>,
    workers: Mutex<Option<Workers>>,
}

impl CameraPipeline {
    pub fn new(config: CameraConfig, detectors: DetectorSet, deps: PipelineDeps) -> Self {
        let buffer = FrameBuffer::new(deps.settings.buffer_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                deps,
                detectors,
                buffer,
                latest: Mutex::new(None),
                generation: AtomicU64::new(0),
                stats: PipelineStats::default(),
                release: Mutex::new(None),
            }),
            workers: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.shared.config
    }

    pub fn camera_id(&self) -> &str {
        &self.shared.config.id
    }

    pub fn state(&self) -> PipelineState {
        if self.workers.lock().is_some() {
            PipelineState::Running
        } else {
            PipelineState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Launch the capture and detection loops. No-op while already running.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.is_some() {
            return Ok(());
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let camera_id = self.camera_id().to_string();

        let capture = {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name(format!("capture-{}", camera_id))
                .spawn(move || worker::capture_loop(shared, generation))?
        };

        let detect = {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name(format!("detect-{}", camera_id))
                .spawn(move || worker::detection_loop(shared, generation))
        };
        let detect = match detect {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.generation.fetch_add(1, Ordering::AcqRel);
                join_until(capture, &camera_id, "capture", Instant::now() + self.shared.deps.settings.stop_timeout());
                return Err(e.into());
            }
        };

        *workers = Some(Workers {
            generation,
            capture,
            detect,
        });
        info!(camera_id = %camera_id, camera = %self.shared.config.name, generation, "Started video processing");
        Ok(())
    }

    /// Retire the running generation and release its stream without
    /// waiting for the loops.
    fn halt(&self) -> Option<Workers> {
        let workers = self.workers.lock().take()?;
        // Only retire our own generation; a racing start already moved on.
        let _ = self.shared.generation.compare_exchange(
            workers.generation,
            workers.generation + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Some(handle) = self.shared.take_release(workers.generation) {
            handle.release();
            debug!(camera_id = %self.camera_id(), generation = workers.generation, "Released camera stream");
        }
        Some(workers)
    }

    /// Signal both loops and wait for them up to the configured timeout.
    /// Safe to call when the pipeline never started.
    pub fn stop(&self) {
        let deadline = Instant::now() + self.shared.deps.settings.stop_timeout();
        self.stop_by(deadline);
    }

    pub(crate) fn stop_by(&self, deadline: Instant) {
        let Some(workers) = self.halt() else {
            return;
        };
        let started = Instant::now();
        let generation = workers.generation;
        workers.join(self.camera_id(), deadline);
        info!(
            camera_id = %self.camera_id(),
            generation,
            "Stopped video processing in {}",
            format_duration(started.elapsed())
        );
    }

    /// Stop this pipeline and build its replacement from `config`. The
    /// replacement keeps the same detectors and collaborators but gets a
    /// fresh buffer and transport; it is returned stopped.
    pub fn update_config(&self, config: CameraConfig) -> CameraPipeline {
        self.stop();
        debug!(camera_id = %config.id, "Rebuilding pipeline with new configuration");
        CameraPipeline::new(config, self.shared.detectors.clone(), self.shared.deps.clone())
    }

    pub fn load_identities(&self, roster: &[IdentityRecord]) {
        self.shared.detectors.load_identities(roster);
        debug!(camera_id = %self.camera_id(), count = roster.len(), "Loaded known identities");
    }

    /// Most recent frame accepted into the buffer, if any. Does not consume
    /// from the detection queue.
    pub fn latest_frame(&self) -> Option<SharedFrame> {
        self.shared.latest.lock().clone()
    }

    pub fn buffered_frames(&self) -> usize {
        self.shared.buffer.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for CameraPipeline {
    fn drop(&mut self) {
        if self.halt().is_some() {
            debug!(camera_id = %self.camera_id(), "Pipeline dropped while running, loops detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticTransport;
    use crate::events::DiscardSink;

    fn deps() -> PipelineDeps {
        PipelineDeps::new(Arc::new(SyntheticTransport), Arc::new(DiscardSink)).with_settings(
            PipelineSettings {
                capture_delay_ms: 1,
                idle_poll_ms: 5,
                stop_timeout_ms: 1_000,
                ..Default::default()
            },
        )
    }

    fn pipeline(uri: &str) -> CameraPipeline {
        let config = CameraConfig::new("cam-1", "Dock", uri, "tenant-a");
        CameraPipeline::new(config, DetectorSet::disabled(), deps())
    }

    #[test]
    fn test_stop_without_start_is_safe() {
        let pipeline = pipeline("sim://dock");
        pipeline.stop();
        pipeline.stop();
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn test_start_is_idempotent() {
        let pipeline = pipeline("sim://dock");
        pipeline.start().unwrap();
        let generation = pipeline.shared.generation.load(Ordering::Acquire);
        pipeline.start().unwrap();
        assert_eq!(pipeline.shared.generation.load(Ordering::Acquire), generation);
        assert!(pipeline.is_running());

        pipeline.stop();
        assert!(!pipeline.is_running());
        assert_ne!(pipeline.shared.generation.load(Ordering::Acquire), generation);
    }

    #[test]
    fn test_latest_frame_after_capture() {
        let pipeline = pipeline("sim://dock?frames=3&width=8&height=8");
        assert!(pipeline.latest_frame().is_none());
        pipeline.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pipeline.stats().frames_captured < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let frame = pipeline.latest_frame().expect("a frame was captured");
        assert_eq!(frame.camera_id, "cam-1");
        assert_eq!((frame.width(), frame.height()), (8, 8));
        // The finite stream has ended but the pipeline stays nominally running.
        assert!(pipeline.is_running());
        pipeline.stop();
    }

    #[test]
    fn test_update_config_returns_stopped_replacement() {
        let original = pipeline("sim://dock");
        original.start().unwrap();

        let config = original.config().clone().with_detection(false);
        let replacement = original.update_config(config);
        assert!(!original.is_running());
        assert!(!replacement.is_running());
        assert!(!replacement.config().ai_detection_enabled);
    }
}
