//! Owns one [`CameraPipeline`] per configured camera and applies camera
//! admin operations to them.
//!
//! Every operation is safe to call from any thread. Unknown or duplicate
//! ids are logged and ignored; nothing here returns an error to the
//! caller for a bad id.

use camwatch_common::{CameraConfig, CameraPatch, IdentityRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{CameraPipeline, PipelineDeps, StatsSnapshot};
use crate::camera::SharedFrame;
use crate::detection::DetectorFactory;

pub struct PipelineRegistry {
    pipelines: DashMap<String, Arc<CameraPipeline>>,
    factory: Arc<dyn DetectorFactory>,
    deps: PipelineDeps,
    /// Last roster handed to `load_known_identities`, applied to cameras
    /// added afterwards.
    roster: RwLock<Arc<Vec<IdentityRecord>>>,
}

impl PipelineRegistry {
    pub fn new(factory: Arc<dyn DetectorFactory>, deps: PipelineDeps) -> Self {
        Self {
            pipelines: DashMap::new(),
            factory,
            deps,
            roster: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Register a camera and start it when it is active with detection
    /// enabled. Returns `false` if the id is already taken.
    pub fn add_camera(&self, config: CameraConfig) -> bool {
        if self.pipelines.contains_key(&config.id) {
            warn!(camera_id = %config.id, "Camera already registered, ignoring add");
            return false;
        }
        // Detector construction may be slow or read the registry; keep it
        // outside the map lock.
        let pipeline = Arc::new(self.build(config));
        match self.pipelines.entry(pipeline.camera_id().to_string()) {
            Entry::Occupied(_) => {
                warn!(camera_id = %pipeline.camera_id(), "Camera registered concurrently, ignoring add");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(pipeline.clone());
            }
        }
        info!(camera_id = %pipeline.camera_id(), camera = %pipeline.config().name, "Camera added");
        self.autostart(&pipeline);
        true
    }

    /// Stop and forget a camera.
    pub fn remove_camera(&self, camera_id: &str) -> bool {
        match self.pipelines.remove(camera_id) {
            Some((_, pipeline)) => {
                pipeline.stop();
                info!(camera_id, "Camera removed");
                true
            }
            None => {
                warn!(camera_id, "Unknown camera, ignoring remove");
                false
            }
        }
    }

    /// Replace a camera's configuration. The old pipeline is stopped and a
    /// fresh one takes its place, started if the new config calls for it.
    pub fn update_camera(&self, camera_id: &str, config: CameraConfig) -> bool {
        if config.id != camera_id {
            warn!(camera_id, new_id = %config.id, "Camera id cannot change on update, ignoring");
            return false;
        }
        let Some(current) = self.get(camera_id) else {
            warn!(camera_id, "Unknown camera, ignoring update");
            return false;
        };

        // Stops `current` outside any map lock.
        let replacement = Arc::new(current.update_config(config));

        match self.pipelines.get_mut(camera_id) {
            Some(mut slot) if Arc::ptr_eq(slot.value(), &current) => {
                *slot = replacement.clone();
            }
            _ => {
                debug!(camera_id, "Camera changed underneath update, dropping replacement");
                return false;
            }
        }
        info!(camera_id, "Camera updated");
        self.autostart(&replacement);
        true
    }

    /// Apply a partial update. Returns the resulting config, or `None` for
    /// an unknown camera.
    pub fn patch_camera(&self, camera_id: &str, patch: CameraPatch) -> Option<CameraConfig> {
        let Some(current) = self.camera_config(camera_id) else {
            warn!(camera_id, "Unknown camera, ignoring patch");
            return None;
        };
        if patch.is_empty() {
            return Some(current);
        }
        let updated = patch.apply(&current);
        if self.update_camera(camera_id, updated.clone()) {
            Some(updated)
        } else {
            None
        }
    }

    pub fn start_camera(&self, camera_id: &str) -> bool {
        let Some(pipeline) = self.get(camera_id) else {
            warn!(camera_id, "Unknown camera, ignoring start");
            return false;
        };
        match pipeline.start() {
            Ok(()) => true,
            Err(e) => {
                error!(camera_id, "Failed to start camera: {}", e);
                false
            }
        }
    }

    pub fn stop_camera(&self, camera_id: &str) -> bool {
        let Some(pipeline) = self.get(camera_id) else {
            warn!(camera_id, "Unknown camera, ignoring stop");
            return false;
        };
        pipeline.stop();
        true
    }

    /// Push a roster to every registered camera and remember it for cameras
    /// added later.
    pub fn load_known_identities(&self, roster: Vec<IdentityRecord>) {
        let roster = Arc::new(roster);
        *self.roster.write() = roster.clone();
        for pipeline in self.snapshot() {
            pipeline.load_identities(&roster);
        }
        info!(count = roster.len(), "Known identities loaded");
    }

    pub fn known_identities(&self) -> Arc<Vec<IdentityRecord>> {
        self.roster.read().clone()
    }

    /// Ids of cameras whose pipeline is running, sorted.
    pub fn active_camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pipelines
            .iter()
            .filter(|entry| entry.value().is_running())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Every registered camera id, sorted.
    pub fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pipelines.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn camera_config(&self, camera_id: &str) -> Option<CameraConfig> {
        self.pipelines.get(camera_id).map(|p| p.config().clone())
    }

    pub fn is_running(&self, camera_id: &str) -> bool {
        self.get(camera_id).is_some_and(|p| p.is_running())
    }

    pub fn latest_frame(&self, camera_id: &str) -> Option<SharedFrame> {
        self.get(camera_id)?.latest_frame()
    }

    pub fn camera_stats(&self, camera_id: &str) -> Option<StatsSnapshot> {
        self.get(camera_id).map(|p| p.stats())
    }

    pub fn stats(&self) -> BTreeMap<String, StatsSnapshot> {
        self.pipelines
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Stop every pipeline and clear the registry. All loops are signalled
    /// first and then joined against one shared deadline.
    pub fn stop_all(&self) {
        let ids: Vec<String> = self.pipelines.iter().map(|entry| entry.key().clone()).collect();
        let removed: Vec<Arc<CameraPipeline>> = ids
            .iter()
            .filter_map(|id| self.pipelines.remove(id).map(|(_, p)| p))
            .collect();

        let halted: Vec<_> = removed
            .iter()
            .filter_map(|p| p.halt().map(|workers| (p, workers)))
            .collect();
        let deadline = Instant::now() + self.deps.settings.stop_timeout();
        for (pipeline, workers) in halted {
            workers.join(pipeline.camera_id(), deadline);
        }
        info!(count = removed.len(), "All cameras stopped");
    }

    fn get(&self, camera_id: &str) -> Option<Arc<CameraPipeline>> {
        self.pipelines.get(camera_id).map(|p| p.value().clone())
    }

    fn snapshot(&self) -> Vec<Arc<CameraPipeline>> {
        self.pipelines.iter().map(|entry| entry.value().clone()).collect()
    }

    fn build(&self, config: CameraConfig) -> CameraPipeline {
        let detectors = self.factory.build(&config);
        let roster = self.known_identities();
        if !roster.is_empty() {
            detectors.load_identities(&roster);
        }
        CameraPipeline::new(config, detectors, self.deps.clone())
    }

    fn autostart(&self, pipeline: &CameraPipeline) {
        let config = pipeline.config();
        if !config.should_autostart() {
            debug!(
                camera_id = %config.id,
                is_active = config.is_active,
                ai_detection_enabled = config.ai_detection_enabled,
                "Camera not started automatically"
            );
            return;
        }
        if let Err(e) = pipeline.start() {
            error!(camera_id = %config.id, "Failed to start camera: {}", e);
        }
    }
}

impl Drop for PipelineRegistry {
    fn drop(&mut self) {
        if !self.pipelines.is_empty() {
            self.stop_all();
        }
    }
}
