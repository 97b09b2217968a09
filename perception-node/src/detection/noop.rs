use camwatch_common::{IdentityRecord, RestrictedZone};

use super::{FaceMatch, FaceMatcher, ObjectScan, ObjectScanner, VehicleRead, VehicleReader};
use crate::camera::Frame;
use crate::error::Result;

/// Stand-in for every capability when no engine is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDetector;

impl FaceMatcher for NoopDetector {
    fn match_faces(&self, _frame: &Frame) -> Result<Vec<FaceMatch>> {
        Ok(Vec::new())
    }

    fn load_identities(&self, _roster: &[IdentityRecord]) {}
}

impl VehicleReader for NoopDetector {
    fn read_vehicles(&self, _frame: &Frame) -> Result<Vec<VehicleRead>> {
        Ok(Vec::new())
    }
}

impl ObjectScanner for NoopDetector {
    fn scan(&self, _frame: &Frame, _zones: &[RestrictedZone]) -> Result<ObjectScan> {
        Ok(ObjectScan::default())
    }
}
