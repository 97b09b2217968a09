//! Process-scoped application context.
//!
//! Built once at startup and passed to whatever needs it. Wires the
//! pipeline registry's event sink to persistence and to the observer hub,
//! and mirrors camera admin actions to observers as `camera_status`
//! messages.

use camwatch_common::{
    AlertPayload, CameraAction, CameraConfig, CameraPatch, CameraStatusUpdate, DetectionEvent,
    IdentityRecord,
};
use camwatch_perception::{
    CameraTransport, DetectorFactory, EventSink, PipelineDeps, PipelineRegistry,
};
use std::sync::Arc;
use validator::Validate;

use crate::config::OperatorConfig;
use crate::error::Result;
use crate::realtime::ConnectionHub;

/// Where detection events are persisted. Implemented outside this crate
/// by whatever store the deployment uses.
pub trait EventRepository: Send + Sync {
    fn record(&self, event: &DetectionEvent) -> Result<()>;
}

/// Repository that only writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRepository;

impl EventRepository for LoggingRepository {
    fn record(&self, event: &DetectionEvent) -> Result<()> {
        tracing::info!(
            event_id = %event.id,
            camera_id = %event.camera_id,
            tenant_id = %event.tenant_id,
            kind = %event.kind,
            "{}",
            event.description
        );
        Ok(())
    }
}

/// Sink handed to every pipeline: persist, then push to the tenant.
struct EventFanout {
    hub: Arc<ConnectionHub>,
    repository: Arc<dyn EventRepository>,
}

impl EventSink for EventFanout {
    fn emit(&self, event: DetectionEvent) {
        if let Err(e) = self.repository.record(&event) {
            tracing::error!(event_id = %event.id, camera_id = %event.camera_id, "Failed to record event: {}", e);
        }

        self.hub.broadcast_event(&event);
        if event.kind.is_alert() {
            self.hub
                .broadcast_alert(AlertPayload::from(&event), &event.tenant_id);
        }
    }
}

pub struct AppContext {
    hub: Arc<ConnectionHub>,
    registry: PipelineRegistry,
}

impl AppContext {
    pub fn new(
        config: &OperatorConfig,
        transport: Arc<dyn CameraTransport>,
        factory: Arc<dyn DetectorFactory>,
        repository: Arc<dyn EventRepository>,
    ) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let sink = Arc::new(EventFanout {
            hub: hub.clone(),
            repository,
        });
        let deps = PipelineDeps::new(transport, sink)
            .with_settings(config.pipeline.clone())
            .with_detection(config.detection.clone());

        Self {
            hub,
            registry: PipelineRegistry::new(factory, deps),
        }
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn add_camera(&self, config: CameraConfig) -> bool {
        if let Err(e) = config.validate() {
            tracing::warn!(camera_id = %config.id, "Rejecting invalid camera config: {}", e);
            return false;
        }
        let camera_id = config.id.clone();
        if !self.registry.add_camera(config) {
            return false;
        }
        self.announce(CameraAction::Created, &camera_id);
        true
    }

    pub fn update_camera(&self, camera_id: &str, config: CameraConfig) -> bool {
        if let Err(e) = config.validate() {
            tracing::warn!(camera_id, "Rejecting invalid camera config: {}", e);
            return false;
        }
        if !self.registry.update_camera(camera_id, config) {
            return false;
        }
        self.announce(CameraAction::Updated, camera_id);
        true
    }

    pub fn patch_camera(&self, camera_id: &str, patch: CameraPatch) -> Option<CameraConfig> {
        let current = self.registry.camera_config(camera_id)?;
        if patch.is_empty() {
            return Some(current);
        }
        if let Err(e) = patch.apply(&current).validate() {
            tracing::warn!(camera_id, "Rejecting invalid camera patch: {}", e);
            return None;
        }
        let updated = self.registry.patch_camera(camera_id, patch)?;
        self.announce(CameraAction::Updated, camera_id);
        Some(updated)
    }

    pub fn remove_camera(&self, camera_id: &str) -> bool {
        let Some(config) = self.registry.camera_config(camera_id) else {
            tracing::warn!(camera_id, "Unknown camera, ignoring remove");
            return false;
        };
        if !self.registry.remove_camera(camera_id) {
            return false;
        }
        self.hub.broadcast_camera_status(
            CameraStatusUpdate::deleted(camera_id),
            &config.tenant_id,
        );
        true
    }

    pub fn start_camera(&self, camera_id: &str) -> bool {
        if !self.registry.start_camera(camera_id) {
            return false;
        }
        self.announce(CameraAction::Started, camera_id);
        true
    }

    pub fn stop_camera(&self, camera_id: &str) -> bool {
        if !self.registry.stop_camera(camera_id) {
            return false;
        }
        self.announce(CameraAction::Stopped, camera_id);
        true
    }

    pub fn load_known_identities(&self, roster: Vec<IdentityRecord>) {
        self.registry.load_known_identities(roster);
    }

    /// Stop every pipeline, then close every observer connection.
    pub fn shutdown(&self) {
        self.registry.stop_all();
        self.hub.close_all();
    }

    fn announce(&self, action: CameraAction, camera_id: &str) {
        let Some(config) = self.registry.camera_config(camera_id) else {
            return;
        };
        let running = self.registry.is_running(camera_id);
        self.hub.broadcast_camera_status(
            CameraStatusUpdate::new(action, &config, running),
            &config.tenant_id,
        );
    }
}
