//! Published skeleton of the currently tracked body.

use crate::joints::{native_joint, JOINT_COUNT};
use crate::native::{BodyFrame, RawJoint};
use crate::types::{JointRole, JointSample};
use parking_lot::RwLock;

/// Consistent copy of the published skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonSnapshot {
    pub tracked: bool,
    /// Tracking id of the body the joint data came from, 0 before any body.
    pub body_id: u64,
    /// Indexed by native joint.
    pub joints: [RawJoint; JOINT_COUNT],
    /// Indexed by native joint, [x, y, z, w].
    pub orientations: [[f32; 4]; JOINT_COUNT],
}

impl SkeletonSnapshot {
    fn empty() -> Self {
        Self {
            tracked: false,
            body_id: 0,
            joints: [RawJoint::default(); JOINT_COUNT],
            orientations: [[0.0, 0.0, 0.0, 1.0]; JOINT_COUNT],
        }
    }

    /// One sample per surfaced role, in role order.
    pub fn samples(&self) -> Vec<JointSample> {
        JointRole::SURFACED
            .iter()
            .filter_map(|&role| {
                let joint = native_joint(role).ok()?.index();
                let raw = &self.joints[joint];
                Some(JointSample {
                    role,
                    position: [raw.position.x, raw.position.y, raw.position.z],
                    orientation: self.orientations[joint],
                    tracking_state: raw.tracking_state,
                })
            })
            .collect()
    }
}

/// Skeleton storage shared between the polling thread and readers.
///
/// Written only by the polling thread; the whole snapshot is replaced under
/// the write lock so readers never see a half-updated joint array.
pub struct SkeletonStore {
    inner: RwLock<SkeletonSnapshot>,
}

impl Default for SkeletonStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SkeletonStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SkeletonSnapshot::empty()),
        }
    }

    /// Publish the first tracked body of `frame`.
    ///
    /// Bodies are not ranked or merged: the first slot reporting tracked wins.
    /// When no slot is tracked only the tracked flag is cleared and the last
    /// published joints stay in place.
    pub fn apply_body_frame(&self, frame: &BodyFrame) {
        let mut snapshot = self.inner.write();
        match frame.bodies.iter().find(|body| body.is_tracked) {
            Some(body) => {
                snapshot.tracked = true;
                snapshot.body_id = body.tracking_id;
                snapshot.joints = body.joints;
                snapshot.orientations = body.orientations;
            }
            None => snapshot.tracked = false,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.inner.read().tracked
    }

    pub fn snapshot(&self) -> SkeletonSnapshot {
        self.inner.read().clone()
    }

    pub fn samples(&self) -> Vec<JointSample> {
        self.inner.read().samples()
    }
}
