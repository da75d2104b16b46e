//! Mapping between host joint roles and the sensor's native joint indices.

use crate::types::JointRole;
use crate::{KinectError, Result};

/// Number of joints the sensor reports per body.
pub const JOINT_COUNT: usize = 25;

/// Maximum number of body slots in one body frame.
pub const BODY_COUNT: usize = 6;

/// The sensor's native joint index space.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeJoint {
    SpineBase = 0,
    SpineMid = 1,
    Neck = 2,
    Head = 3,
    ShoulderLeft = 4,
    ElbowLeft = 5,
    WristLeft = 6,
    HandLeft = 7,
    ShoulderRight = 8,
    ElbowRight = 9,
    WristRight = 10,
    HandRight = 11,
    HipLeft = 12,
    KneeLeft = 13,
    AnkleLeft = 14,
    FootLeft = 15,
    HipRight = 16,
    KneeRight = 17,
    AnkleRight = 18,
    FootRight = 19,
    SpineShoulder = 20,
    HandTipLeft = 21,
    ThumbLeft = 22,
    HandTipRight = 23,
    ThumbRight = 24,
}

impl NativeJoint {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Native joint for each surfaced role, indexed by `JointRole as usize`.
///
/// The host's "foot" is the sensor's ankle and the host's "foot tip" is the
/// sensor's foot.
const ROLE_TABLE: [NativeJoint; JOINT_COUNT] = [
    NativeJoint::Head,
    NativeJoint::Neck,
    NativeJoint::SpineShoulder,
    NativeJoint::ShoulderLeft,
    NativeJoint::ElbowLeft,
    NativeJoint::WristLeft,
    NativeJoint::HandLeft,
    NativeJoint::HandTipLeft,
    NativeJoint::ThumbLeft,
    NativeJoint::ShoulderRight,
    NativeJoint::ElbowRight,
    NativeJoint::WristRight,
    NativeJoint::HandRight,
    NativeJoint::HandTipRight,
    NativeJoint::ThumbRight,
    NativeJoint::SpineMid,
    NativeJoint::SpineBase,
    NativeJoint::HipLeft,
    NativeJoint::KneeLeft,
    NativeJoint::AnkleLeft,
    NativeJoint::FootLeft,
    NativeJoint::HipRight,
    NativeJoint::KneeRight,
    NativeJoint::AnkleRight,
    NativeJoint::FootRight,
];

/// Look up the native joint for a role. Fails for `Manual`.
pub fn native_joint(role: JointRole) -> Result<NativeJoint> {
    ROLE_TABLE
        .get(role as usize)
        .copied()
        .ok_or(KinectError::UnmappedJoint(role))
}

/// Look up the native joint index for a host integer role.
pub fn native_index(role: i32) -> Result<usize> {
    let role = JointRole::from_index(role)?;
    native_joint(role).map(NativeJoint::index)
}
