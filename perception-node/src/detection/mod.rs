//! Detector capability set.
//!
//! The pipeline never depends on a concrete vision engine. Face matching,
//! vehicle/plate reading and object/zone scanning are injected behind the
//! traits below, one [`DetectorSet`] per camera.

use camwatch_common::{BBox, CameraConfig, IdentityRecord, RestrictedZone};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::camera::Frame;
use crate::error::Result;

mod noop;

pub use noop::NoopDetector;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    /// `None` when the face did not match anyone on the roster.
    pub identity_id: Option<String>,
    pub name: String,
    pub confidence: f32,
    pub region: BBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRead {
    /// `None` when a vehicle was found but its plate could not be read.
    pub plate_text: Option<String>,
    pub vehicle_class: String,
    pub confidence: f32,
    pub region: BBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneIntrusion {
    pub zone_name: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectScan {
    pub counts: BTreeMap<String, u32>,
    pub intrusions: Vec<ZoneIntrusion>,
}

pub trait FaceMatcher: Send + Sync {
    fn match_faces(&self, frame: &Frame) -> Result<Vec<FaceMatch>>;

    /// Replace the roster of known identities. May be called while the
    /// owning pipeline is running.
    fn load_identities(&self, roster: &[IdentityRecord]);
}

pub trait VehicleReader: Send + Sync {
    fn read_vehicles(&self, frame: &Frame) -> Result<Vec<VehicleRead>>;
}

pub trait ObjectScanner: Send + Sync {
    fn scan(&self, frame: &Frame, zones: &[RestrictedZone]) -> Result<ObjectScan>;
}

/// Raw results of one detection pass over one sampled frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorOutputs {
    pub faces: Vec<FaceMatch>,
    pub vehicles: Vec<VehicleRead>,
    pub objects: ObjectScan,
}

#[derive(Clone)]
pub struct DetectorSet {
    pub faces: Arc<dyn FaceMatcher>,
    pub vehicles: Arc<dyn VehicleReader>,
    pub objects: Arc<dyn ObjectScanner>,
}

impl DetectorSet {
    pub fn new(
        faces: Arc<dyn FaceMatcher>,
        vehicles: Arc<dyn VehicleReader>,
        objects: Arc<dyn ObjectScanner>,
    ) -> Self {
        Self {
            faces,
            vehicles,
            objects,
        }
    }

    /// A set that never detects anything.
    pub fn disabled() -> Self {
        let noop = Arc::new(NoopDetector);
        Self::new(noop.clone(), noop.clone(), noop)
    }

    /// Run every detector over the frame. The first failure aborts the pass.
    pub fn run(&self, frame: &Frame, zones: &[RestrictedZone]) -> Result<DetectorOutputs> {
        Ok(DetectorOutputs {
            faces: self.faces.match_faces(frame)?,
            vehicles: self.vehicles.read_vehicles(frame)?,
            objects: self.objects.scan(frame, zones)?,
        })
    }

    pub fn load_identities(&self, roster: &[IdentityRecord]) {
        self.faces.load_identities(roster);
    }
}

/// Builds the detector set for a camera when its pipeline is created.
pub trait DetectorFactory: Send + Sync {
    fn build(&self, camera: &CameraConfig) -> DetectorSet;
}

impl<F> DetectorFactory for F
where
    F: Fn(&CameraConfig) -> DetectorSet + Send + Sync,
{
    fn build(&self, camera: &CameraConfig) -> DetectorSet {
        self(camera)
    }
}
