/// Portable joint identifiers exposed to the host.
///
/// The discriminants are the integers the host uses. `Manual` is reserved for
/// host-side joints and never has a native counterpart.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JointRole {
    Head = 0,
    Neck = 1,
    SpineShoulder = 2,
    ShoulderLeft = 3,
    ElbowLeft = 4,
    WristLeft = 5,
    HandLeft = 6,
    HandTipLeft = 7,
    ThumbLeft = 8,
    ShoulderRight = 9,
    ElbowRight = 10,
    WristRight = 11,
    HandRight = 12,
    HandTipRight = 13,
    ThumbRight = 14,
    SpineMiddle = 15,
    SpineWaist = 16,
    HipLeft = 17,
    KneeLeft = 18,
    FootLeft = 19,
    FootTipLeft = 20,
    HipRight = 21,
    KneeRight = 22,
    FootRight = 23,
    FootTipRight = 24,
    Manual = 25,
}

impl JointRole {
    /// Every role that maps onto a tracked native joint, in host order.
    pub const SURFACED: [JointRole; 25] = [
        JointRole::Head,
        JointRole::Neck,
        JointRole::SpineShoulder,
        JointRole::ShoulderLeft,
        JointRole::ElbowLeft,
        JointRole::WristLeft,
        JointRole::HandLeft,
        JointRole::HandTipLeft,
        JointRole::ThumbLeft,
        JointRole::ShoulderRight,
        JointRole::ElbowRight,
        JointRole::WristRight,
        JointRole::HandRight,
        JointRole::HandTipRight,
        JointRole::ThumbRight,
        JointRole::SpineMiddle,
        JointRole::SpineWaist,
        JointRole::HipLeft,
        JointRole::KneeLeft,
        JointRole::FootLeft,
        JointRole::FootTipLeft,
        JointRole::HipRight,
        JointRole::KneeRight,
        JointRole::FootRight,
        JointRole::FootTipRight,
    ];

    /// Parse a host integer. `Manual` is a valid role; anything past it is not.
    pub fn from_index(index: i32) -> crate::Result<JointRole> {
        match index {
            0..=24 => Ok(JointRole::SURFACED[index as usize]),
            25 => Ok(JointRole::Manual),
            _ => Err(crate::KinectError::JointOutOfRange(index)),
        }
    }
}

/// Per-joint tracking confidence as reported by the sensor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    NotTracked = 0,
    Inferred = 1,
    Tracked = 2,
}

/// One joint of the published skeleton.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSample {
    pub role: JointRole,
    /// Sensor-space position in meters [x, y, z].
    pub position: [f32; 3],
    /// Unit quaternion [x, y, z, w].
    pub orientation: [f32; 4],
    pub tracking_state: TrackingState,
}

/// Result of probing the live sensor's availability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Available,
    Unavailable,
    Error,
}

impl DeviceStatus {
    pub fn code(self) -> i32 {
        match self {
            DeviceStatus::Available => 0,
            DeviceStatus::Unavailable => 1,
            DeviceStatus::Error => -1,
        }
    }
}

/// Outcome of [`crate::KinectDevice::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Ok,
    NotAvailable,
    Error,
}

impl InitStatus {
    pub fn code(self) -> i32 {
        match self {
            InitStatus::Ok => 0,
            InitStatus::NotAvailable => 1,
            InitStatus::Error => -1,
        }
    }
}

/// Outcome of [`crate::KinectDevice::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    Ok,
    NoSensor,
    /// Subscriptions were released but closing the sensor failed.
    CloseFailed,
    /// Unsubscribing failed while the handle was still valid.
    Error,
}

impl ShutdownStatus {
    pub fn code(self) -> i32 {
        match self {
            ShutdownStatus::Ok => 0,
            ShutdownStatus::NoSensor => 1,
            ShutdownStatus::CloseFailed => -2,
            ShutdownStatus::Error => -1,
        }
    }
}

/// Pixel layout of the published color buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra32 = 0,
}

/// Owned copy of the latest color frame.
#[derive(Debug, Clone)]
pub struct ColorFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Borrowed view of the latest color frame, valid while the store is locked.
#[derive(Debug, Clone, Copy)]
pub struct ColorFrameRef<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl ColorFrameRef<'_> {
    pub fn to_frame(&self) -> ColorFrame {
        ColorFrame {
            data: self.data.to_vec(),
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }
}

bitflags::bitflags! {
    /// Frame sources a multi-source reader can be opened on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct FrameSources: u32 {
        const COLOR                  = 1 << 0;
        const INFRARED               = 1 << 1;
        const LONG_EXPOSURE_INFRARED = 1 << 2;
        const DEPTH                  = 1 << 3;
        const BODY_INDEX             = 1 << 4;
        const BODY                   = 1 << 5;
        const AUDIO                  = 1 << 6;
    }
}
