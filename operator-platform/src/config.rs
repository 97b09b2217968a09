use camwatch_common::{CameraConfig, IdentityRecord};
use camwatch_perception::{DetectionSettings, PipelineSettings};
use config::builder::{ConfigBuilder, DefaultState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use crate::error::{OperatorError, Result};

pub const ENV_PREFIX: &str = "CAMWATCH";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OperatorConfig {
    pub node_id: String,
    pub cameras: Vec<CameraConfig>,
    pub pipeline: PipelineSettings,
    pub detection: DetectionSettings,
    pub identities: Vec<IdentityRecord>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            node_id: "camwatch-operator".to_string(),
            cameras: Vec::new(),
            pipeline: PipelineSettings::default(),
            detection: DetectionSettings::default(),
            identities: Vec::new(),
        }
    }
}

impl OperatorConfig {
    /// Layer the file at `path` with `CAMWATCH__*` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::with_name(path))
                .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__")),
        )
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::from_str(text, config::FileFormat::Yaml)),
        )
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder
            .build()
            .map_err(|e| OperatorError::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| OperatorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        Ok(())
    }

    /// Camera entries that pass validation, first occurrence of each id
    /// only. Rejected entries are logged and skipped.
    pub fn valid_cameras(&self) -> Vec<CameraConfig> {
        let mut seen = HashSet::new();
        let mut cameras = Vec::with_capacity(self.cameras.len());

        for camera in &self.cameras {
            if let Err(e) = camera.validate() {
                tracing::warn!(camera_id = %camera.id, "Skipping invalid camera config: {}", e);
                continue;
            }
            if !seen.insert(camera.id.clone()) {
                tracing::warn!(camera_id = %camera.id, "Skipping duplicate camera config");
                continue;
            }
            cameras.push(camera.clone());
        }
        cameras
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_perception::SamplingPolicy;

    const SAMPLE: &str = r#"
node_id: dock-node
pipeline:
  detection_interval_ms: 500
  sampling: newest
detection:
  object_classes:
    - person
cameras:
  - id: C1
    name: Gate
    stream_uri: sim://gate?fps=10
    tenant_id: tenant-a
  - id: C2
    name: Broken
    stream_uri: ftp://nowhere
    tenant_id: tenant-a
  - id: C1
    name: Gate again
    stream_uri: sim://gate
    tenant_id: tenant-a
identities:
  - person_id: p-1
    name: Alice
"#;

    #[test]
    fn test_yaml_overrides_and_defaults() {
        let config = OperatorConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.node_id, "dock-node");
        assert_eq!(config.pipeline.detection_interval_ms, 500);
        assert_eq!(config.pipeline.sampling, SamplingPolicy::Newest);
        assert_eq!(config.pipeline.buffer_capacity, 10);
        assert_eq!(config.detection.object_classes, vec!["person".to_string()]);
        assert_eq!(config.detection.face_confidence_threshold, 0.6);
        assert_eq!(config.identities.len(), 1);
        assert!(config.cameras[0].is_active);
        assert!(config.cameras[0].ai_detection_enabled);
    }

    #[test]
    fn test_invalid_and_duplicate_cameras_are_skipped() {
        let config = OperatorConfig::from_yaml(SAMPLE).unwrap();
        let cameras = config.valid_cameras();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].name, "Gate");
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = OperatorConfig::from_yaml("pipeline:\n  buffer_capacity: 0\n").unwrap_err();
        assert!(matches!(err, OperatorError::Perception(_)));
    }
}
