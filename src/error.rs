use std::fmt;

/// Errors that can occur when driving the body-tracking sensor.
#[derive(Debug, thiserror::Error)]
pub enum KinectError {
    #[error("No sensor attached")]
    DeviceNotFound,

    #[error("Sensor is already owned by another handle")]
    SensorInUse,

    #[error("Failed to open sensor: {0}")]
    OpenFailed(String),

    #[error("Sensor did not become available after warm-up")]
    NotAvailable,

    #[error("Event subscription failed: {0}")]
    Subscribe(String),

    #[error("Frame reader failed: {0}")]
    Reader(String),

    /// The native side already tore the handle down (e.g. abrupt unplug).
    #[error("Event handle is no longer valid")]
    HandleInvalid,

    #[error("Native call failed: {0}")]
    Native(String),

    #[error("Joint role {0:?} has no native joint")]
    UnmappedJoint(crate::types::JointRole),

    #[error("Joint index {0} out of range")]
    JointOutOfRange(i32),

    #[error("Unsupported color image format: {0:?}")]
    UnsupportedColorFormat(crate::color::ColorImageFormat),

    #[error("Color frame size mismatch: expected {expected} bytes, got {got}")]
    ColorFrameSize { expected: usize, got: usize },

    #[error("Failed to spawn polling thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Timeout waiting for frame")]
    Timeout,
}

impl KinectError {
    /// Errors raised while unsubscribing that mean the handle is already gone.
    /// Teardown treats these as success.
    pub fn is_teardown_race(&self) -> bool {
        matches!(self, KinectError::HandleInvalid)
    }
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: parking_lot::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: parking_lot::const_mutex(String::new()),
        }
    }

    pub fn set(&self, err: &KinectError) {
        *self.message.lock() = fmt::format(format_args!("{}\0", err));
    }

    pub fn set_message(&self, msg: &str) {
        *self.message.lock() = fmt::format(format_args!("{}\0", msg));
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        let msg = self.message.lock();
        if msg.is_empty() {
            std::ptr::null()
        } else {
            msg.as_ptr() as *const std::ffi::c_char
        }
    }
}
