use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::utils::validate_stream_uri;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Named polygon inside a camera's field of view, handed to the object
/// scanner, which reports intrusions by zone name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RestrictedZone {
    pub name: String,
    pub polygon: Vec<Point>,
}

impl RestrictedZone {
    pub fn new(name: impl Into<String>, polygon: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            polygon,
        }
    }

    /// Axis-aligned rectangle helper, corners given as (x1, y1) - (x2, y2).
    pub fn rectangle(name: impl Into<String>, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(
            name,
            vec![
                Point::new(x1, y1),
                Point::new(x2, y1),
                Point::new(x2, y2),
                Point::new(x1, y2),
            ],
        )
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct CameraConfig {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(custom = "validate_stream_uri")]
    pub stream_uri: String,

    #[serde(default)]
    pub location: String,

    #[validate(length(min = 1))]
    pub tenant_id: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default = "default_true")]
    pub ai_detection_enabled: bool,

    /// Restricted zones checked by the intrusion scan. Empty means the
    /// node-wide defaults apply.
    #[serde(default)]
    pub zones: Vec<RestrictedZone>,
}

impl CameraConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        stream_uri: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stream_uri: stream_uri.into(),
            location: String::new(),
            tenant_id: tenant_id.into(),
            is_active: true,
            ai_detection_enabled: true,
            zones: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn with_detection(mut self, enabled: bool) -> Self {
        self.ai_detection_enabled = enabled;
        self
    }

    pub fn with_zones(mut self, zones: Vec<RestrictedZone>) -> Self {
        self.zones = zones;
        self
    }

    /// Whether a registry should spin up the pipeline as soon as the camera
    /// is registered.
    pub fn should_autostart(&self) -> bool {
        self.is_active && self.ai_detection_enabled
    }
}

/// Partial camera update. Absent fields keep their current value.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CameraPatch {
    pub name: Option<String>,
    pub stream_uri: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
    pub ai_detection_enabled: Option<bool>,
    pub zones: Option<Vec<RestrictedZone>>,
}

impl CameraPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Produce the patched configuration. The id and tenant never change.
    pub fn apply(&self, current: &CameraConfig) -> CameraConfig {
        let CameraPatch {
            name,
            stream_uri,
            location,
            is_active,
            ai_detection_enabled,
            zones,
        } = self;

        CameraConfig {
            id: current.id.clone(),
            tenant_id: current.tenant_id.clone(),
            name: name.clone().unwrap_or_else(|| current.name.clone()),
            stream_uri: stream_uri
                .clone()
                .unwrap_or_else(|| current.stream_uri.clone()),
            location: location.clone().unwrap_or_else(|| current.location.clone()),
            is_active: is_active.unwrap_or(current.is_active),
            ai_detection_enabled: ai_detection_enabled.unwrap_or(current.ai_detection_enabled),
            zones: zones.clone().unwrap_or_else(|| current.zones.clone()),
        }
    }
}

/// A known person handed to the face matcher.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IdentityRecord {
    pub person_id: String,
    pub name: String,
    #[serde(default)]
    pub face_encoding: Vec<f32>,
    #[serde(default)]
    pub face_image_path: Option<String>,
}

impl IdentityRecord {
    pub fn new(person_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            person_id: person_id.into(),
            name: name.into(),
            face_encoding: Vec::new(),
            face_image_path: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "face_detection")]
    Face,
    #[serde(rename = "vehicle_detection")]
    Vehicle,
    #[serde(rename = "object_detection")]
    Object,
    #[serde(rename = "intrusion")]
    Intrusion,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Face => "face_detection",
            EventKind::Vehicle => "vehicle_detection",
            EventKind::Object => "object_detection",
            EventKind::Intrusion => "intrusion",
        }
    }

    /// High-priority kinds that are also pushed as alerts.
    pub fn is_alert(&self) -> bool {
        matches!(self, EventKind::Intrusion)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectionEvent {
    pub id: Uuid,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    pub camera_id: String,
    pub camera_name: String,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub confidence: Option<f32>,
    pub description: String,
    pub metadata: serde_json::Value,
}

impl DetectionEvent {
    pub fn new(
        kind: EventKind,
        camera: &CameraConfig,
        confidence: Option<f32>,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            camera_id: camera.id.clone(),
            camera_name: camera.name.clone(),
            tenant_id: camera.tenant_id.clone(),
            timestamp: Utc::now(),
            confidence,
            description: description.into(),
            metadata,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AlertPayload {
    pub event_id: Uuid,
    pub kind: EventKind,
    pub camera_id: String,
    pub camera_name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&DetectionEvent> for AlertPayload {
    fn from(event: &DetectionEvent) -> Self {
        Self {
            event_id: event.id,
            kind: event.kind,
            camera_id: event.camera_id.clone(),
            camera_name: event.camera_name.clone(),
            description: event.description.clone(),
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraAction {
    Created,
    Updated,
    Deleted,
    Started,
    Stopped,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CameraStatusUpdate {
    pub action: CameraAction,
    pub camera_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    pub running: bool,
}

impl CameraStatusUpdate {
    pub fn new(action: CameraAction, camera: &CameraConfig, running: bool) -> Self {
        Self {
            action,
            camera_id: camera.id.clone(),
            name: Some(camera.name.clone()),
            is_active: Some(camera.is_active),
            running,
        }
    }

    pub fn deleted(camera_id: impl Into<String>) -> Self {
        Self {
            action: CameraAction::Deleted,
            camera_id: camera_id.into(),
            name: None,
            is_active: None,
            running: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraConfig {
        CameraConfig::new("cam-1", "Dock", "rtsp://10.0.0.5/stream", "tenant-a")
            .with_location("Loading bay")
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let current = camera();
        let patch = CameraPatch {
            name: Some("Dock North".to_string()),
            ai_detection_enabled: Some(false),
            ..Default::default()
        };

        let updated = patch.apply(&current);
        assert_eq!(updated.name, "Dock North");
        assert!(!updated.ai_detection_enabled);
        assert_eq!(updated.stream_uri, current.stream_uri);
        assert_eq!(updated.location, current.location);
        assert_eq!(updated.id, current.id);
        assert_eq!(updated.tenant_id, current.tenant_id);
        assert!(!patch.is_empty());
        assert!(CameraPatch::default().is_empty());
    }

    #[test]
    fn test_autostart_requires_active_and_detection() {
        assert!(camera().should_autostart());
        assert!(!camera().with_detection(false).should_autostart());
        assert!(!camera().with_active(false).should_autostart());
    }

    #[test]
    fn test_camera_validation() {
        assert!(camera().validate().is_ok());

        let mut bad = camera();
        bad.stream_uri = "ftp://nope".to_string();
        assert!(bad.validate().is_err());

        let mut missing_tenant = camera();
        missing_tenant.tenant_id.clear();
        assert!(missing_tenant.validate().is_err());
    }

    #[test]
    fn test_event_kind_wire_names() {
        let json = serde_json::to_string(&EventKind::Face).unwrap();
        assert_eq!(json, "\"face_detection\"");
        let kind: EventKind = serde_json::from_str("\"intrusion\"").unwrap();
        assert_eq!(kind, EventKind::Intrusion);
        assert!(kind.is_alert());
        assert!(!EventKind::Vehicle.is_alert());
    }

    #[test]
    fn test_camera_config_defaults_from_json() {
        let config: CameraConfig = serde_json::from_str(
            r#"{"id":"c1","name":"Gate","stream_uri":"sim://gate","tenant_id":"t1"}"#,
        )
        .unwrap();
        assert!(config.is_active);
        assert!(config.ai_detection_enabled);
        assert!(config.zones.is_empty());
        assert_eq!(config.location, "");
    }
}
