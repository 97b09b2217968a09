use camwatch_common::RestrictedZone;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PerceptionError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SamplingPolicy {
    /// Sample the oldest queued frame that passes the cadence gate.
    #[default]
    Oldest,
    /// At the gate boundary, drain the queue and sample the newest frame.
    Newest,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub buffer_capacity: usize,
    pub detection_interval_ms: u64,
    pub idle_poll_ms: u64,
    pub capture_delay_ms: u64,
    pub stop_timeout_ms: u64,
    pub sampling: SamplingPolicy,
}

impl PipelineSettings {
    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn capture_delay(&self) -> Duration {
        Duration::from_millis(self.capture_delay_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(PerceptionError::Config(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.idle_poll_ms == 0 {
            return Err(PerceptionError::Config(
                "idle_poll_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 10,
            detection_interval_ms: 1_000,
            idle_poll_ms: 100,
            capture_delay_ms: 33,
            stop_timeout_ms: 5_000,
            sampling: SamplingPolicy::Oldest,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    pub face_confidence_threshold: f32,
    pub vehicle_confidence_threshold: f32,
    /// Object classes whose nonzero counts raise events. Empty means all.
    pub object_classes: Vec<String>,
    /// Zones for cameras that declare none of their own.
    pub default_zones: Vec<RestrictedZone>,
}

impl DetectionSettings {
    pub fn tracks_object_class(&self, class: &str) -> bool {
        self.object_classes.is_empty() || self.object_classes.iter().any(|c| c == class)
    }

    pub fn zones_for<'a>(&'a self, camera_zones: &'a [RestrictedZone]) -> &'a [RestrictedZone] {
        if camera_zones.is_empty() {
            &self.default_zones
        } else {
            camera_zones
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            face_confidence_threshold: 0.6,
            vehicle_confidence_threshold: 0.5,
            object_classes: vec!["gunny_bag".to_string()],
            default_zones: vec![RestrictedZone::rectangle(
                "Restricted Area",
                100.0,
                100.0,
                200.0,
                200.0,
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.buffer_capacity, 10);
        assert_eq!(settings.detection_interval(), Duration::from_secs(1));
        assert_eq!(settings.idle_poll(), Duration::from_millis(100));
        assert_eq!(settings.sampling, SamplingPolicy::Oldest);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let settings = PipelineSettings {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(PerceptionError::Config(_))));
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: PipelineSettings =
            serde_json::from_str(r#"{"detection_interval_ms": 250, "sampling": "newest"}"#).unwrap();
        assert_eq!(settings.detection_interval_ms, 250);
        assert_eq!(settings.sampling, SamplingPolicy::Newest);
        assert_eq!(settings.buffer_capacity, 10);
    }

    #[test]
    fn test_zone_fallback() {
        let settings = DetectionSettings::default();
        assert_eq!(settings.zones_for(&[]).len(), 1);
        let own = vec![RestrictedZone::rectangle("Cage", 0.0, 0.0, 10.0, 10.0)];
        assert_eq!(settings.zones_for(&own)[0].name, "Cage");
        assert!(settings.tracks_object_class("gunny_bag"));
        assert!(!settings.tracks_object_class("person"));
    }
}
