//! Turns raw detector outputs into uniform [`DetectionEvent`]s and hands
//! them to the caller's sink.
//!
//! Sinks are called synchronously from the detection loop, once per event.
//! There is no queue in between, so a slow sink slows that camera's
//! detection cadence instead of piling events up in memory.

use camwatch_common::{CameraConfig, DetectionEvent, EventKind};
use serde_json::json;

use crate::config::DetectionSettings;
use crate::detection::DetectorOutputs;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: DetectionEvent);
}

impl<F> EventSink for F
where
    F: Fn(DetectionEvent) + Send + Sync,
{
    fn emit(&self, event: DetectionEvent) {
        self(event)
    }
}

/// Sink that drops everything. Handy when only frames are wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl EventSink for DiscardSink {
    fn emit(&self, _event: DetectionEvent) {}
}

pub fn build_events(
    camera: &CameraConfig,
    settings: &DetectionSettings,
    outputs: &DetectorOutputs,
) -> Vec<DetectionEvent> {
    let mut events = Vec::new();

    for face in &outputs.faces {
        let Some(person_id) = face.identity_id.as_deref() else {
            continue;
        };
        if face.confidence <= settings.face_confidence_threshold {
            continue;
        }
        events.push(DetectionEvent::new(
            EventKind::Face,
            camera,
            Some(face.confidence),
            format!("Recognized {} at {}", face.name, camera.name),
            json!({
                "person_id": person_id,
                "name": face.name,
                "confidence": face.confidence,
                "region": face.region,
            }),
        ));
    }

    for vehicle in &outputs.vehicles {
        let Some(plate) = vehicle
            .plate_text
            .as_deref()
            .map(|p| p.trim().to_uppercase())
            .filter(|p| !p.is_empty())
        else {
            continue;
        };
        if vehicle.confidence < settings.vehicle_confidence_threshold {
            continue;
        }
        events.push(DetectionEvent::new(
            EventKind::Vehicle,
            camera,
            Some(vehicle.confidence),
            format!("{} with plate {} at {}", vehicle.vehicle_class, plate, camera.name),
            json!({
                "license_plate": plate,
                "vehicle_type": vehicle.vehicle_class,
                "confidence": vehicle.confidence,
                "region": vehicle.region,
            }),
        ));
    }

    for (class, count) in &outputs.objects.counts {
        if *count == 0 || !settings.tracks_object_class(class) {
            continue;
        }
        events.push(DetectionEvent::new(
            EventKind::Object,
            camera,
            None,
            format!("{} x {} at {}", count, class, camera.name),
            json!({
                "object_type": class,
                "count": count,
            }),
        ));
    }

    for intrusion in &outputs.objects.intrusions {
        events.push(DetectionEvent::new(
            EventKind::Intrusion,
            camera,
            Some(intrusion.confidence),
            format!("Intrusion in {} at {}", intrusion.zone_name, camera.name),
            json!({
                "zone_name": intrusion.zone_name,
                "confidence": intrusion.confidence,
            }),
        ));
    }

    events
}

/// Build and emit. Returns how many events went out.
pub fn dispatch(
    camera: &CameraConfig,
    settings: &DetectionSettings,
    outputs: &DetectorOutputs,
    sink: &dyn EventSink,
) -> usize {
    let events = build_events(camera, settings, outputs);
    let emitted = events.len();
    for event in events {
        sink.emit(event);
    }
    emitted
}
