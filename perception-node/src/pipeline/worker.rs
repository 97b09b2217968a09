use chrono::Utc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::{PipelineStats, Shared};
use crate::camera::{Frame, SharedFrame};
use crate::config::SamplingPolicy;
use crate::events;

pub(super) fn capture_loop(shared: Arc<Shared>, generation: u64) {
    let camera_id = shared.config.id.as_str();
    let uri = shared.config.stream_uri.as_str();

    let mut source = match shared.deps.transport.open(uri) {
        Ok(source) => source,
        Err(e) => {
            error!(camera_id, "Could not open camera stream {}: {}", uri, e);
            return;
        }
    };
    if !shared.park_release(generation, source.release_handle()) {
        source.close();
        debug!(camera_id, generation, "Stopped while the stream was opening, closing it");
        return;
    }
    info!(camera_id, "Opened camera stream {}", uri);

    let delay = shared.deps.settings.capture_delay();
    let mut sequence_num = 0u64;

    while shared.is_current(generation) {
        let image = match source.read_frame() {
            Ok(Some(image)) => image,
            Ok(None) => {
                info!(camera_id, "Camera stream ended after {} frames", sequence_num);
                break;
            }
            Err(_) if !shared.is_current(generation) => break,
            Err(e) => {
                error!(camera_id, "Failed to read frame, halting capture: {}", e);
                break;
            }
        };
        // Stop may have landed while we were blocked in the read.
        if !shared.is_current(generation) {
            break;
        }

        sequence_num += 1;
        let frame: SharedFrame = Arc::new(Frame {
            camera_id: camera_id.to_string(),
            image,
            captured_at: Utc::now(),
            sequence_num,
        });
        PipelineStats::bump(&shared.stats.frames_captured, 1);

        if shared.buffer.push(frame.clone()) {
            *shared.latest.lock() = Some(frame);
        } else {
            PipelineStats::bump(&shared.stats.frames_dropped, 1);
            trace!(camera_id, sequence_num, "Frame buffer full, dropping frame");
        }

        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    drop(shared.take_release(generation));
    source.close();
    debug!(camera_id, generation, "Capture loop exited");
}

pub(super) fn detection_loop(shared: Arc<Shared>, generation: u64) {
    let camera_id = shared.config.id.as_str();
    let interval = shared.deps.settings.detection_interval();
    let idle_poll = shared.deps.settings.idle_poll();
    let sampling = shared.deps.settings.sampling;
    let mut last_run: Option<Instant> = None;

    while shared.is_current(generation) {
        let Some(frame) = shared.buffer.pop() else {
            thread::sleep(idle_poll);
            continue;
        };

        let now = Instant::now();
        if last_run.is_some_and(|at| now.duration_since(at) < interval) {
            PipelineStats::bump(&shared.stats.samples_skipped, 1);
            continue;
        }

        let frame = match sampling {
            SamplingPolicy::Oldest => frame,
            SamplingPolicy::Newest => match shared.buffer.drain_newest() {
                Some((newest, discarded)) => {
                    PipelineStats::bump(&shared.stats.samples_skipped, discarded as u64 + 1);
                    newest
                }
                None => frame,
            },
        };
        last_run = Some(now);

        if !shared.config.ai_detection_enabled {
            continue;
        }
        run_cycle(&shared, generation, &frame);
    }

    debug!(camera_id, generation, "Detection loop exited");
}

/// One detection pass. Any detector failure or panic discards the whole
/// cycle; nothing from a failed cycle reaches the sink.
fn run_cycle(shared: &Shared, generation: u64, frame: &Frame) {
    let camera_id = shared.config.id.as_str();
    let detection = shared.deps.detection.as_ref();
    let zones = detection.zones_for(&shared.config.zones);
    PipelineStats::bump(&shared.stats.detection_runs, 1);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.detectors.run(frame, zones)));
    let outputs = match outcome {
        Ok(Ok(outputs)) => outputs,
        Ok(Err(e)) => {
            PipelineStats::bump(&shared.stats.detector_failures, 1);
            warn!(camera_id, sequence_num = frame.sequence_num, "Detection failed, skipping cycle: {}", e);
            return;
        }
        Err(payload) => {
            PipelineStats::bump(&shared.stats.detector_failures, 1);
            error!(
                camera_id,
                sequence_num = frame.sequence_num,
                "Detector panicked, skipping cycle: {}",
                panic_message(payload.as_ref())
            );
            return;
        }
    };

    if !shared.is_current(generation) {
        return;
    }

    let sink = shared.deps.sink.as_ref();
    let dispatched = panic::catch_unwind(AssertUnwindSafe(|| {
        events::dispatch(&shared.config, detection, &outputs, sink)
    }));
    match dispatched {
        Ok(emitted) => {
            PipelineStats::bump(&shared.stats.events_emitted, emitted as u64);
            if emitted > 0 {
                debug!(camera_id, sequence_num = frame.sequence_num, emitted, "Emitted detection events");
            }
        }
        Err(payload) => {
            error!(camera_id, "Event sink panicked: {}", panic_message(payload.as_ref()));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("model exploded")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "model exploded");

        let payload = panic::catch_unwind(|| panic!("{} failed", "scan")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "scan failed");
    }
}
