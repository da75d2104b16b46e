//! C FFI layer for kinect-device.
//!
//! Provides an opaque handle-based API for host binding layers. Return codes
//! match [`InitStatus`], [`ShutdownStatus`] and [`DeviceStatus`]. The
//! generated C header is written to `include/kinect_device.h` by cbindgen.

use crate::config::Config;
use crate::device::KinectDevice;
use crate::error::LastError;
use crate::joints;
use crate::types::{DeviceStatus, InitStatus, ShutdownStatus};
use std::ffi::{c_char, c_int};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque device handle for C consumers.
pub struct KdDevice(KinectDevice);

/// Joint sample in C-compatible layout.
#[repr(C)]
pub struct KdJoint {
    /// Host joint role (0..=24).
    pub role: c_int,
    /// Position [x, y, z] in meters.
    pub position: [f32; 3],
    /// Orientation quaternion [x, y, z, w].
    pub orientation: [f32; 4],
    /// 0 = not tracked, 1 = inferred, 2 = tracked.
    pub tracking_state: c_int,
}

/// Callback invoked on the polling thread with 1 (available) or 0.
pub type KdStatusCallback = extern "C" fn(available: c_int);

/// Create a device using configuration from `KINECT_*` environment variables.
/// Returns NULL on error (check kd_last_error()).
#[no_mangle]
pub extern "C" fn kd_new() -> *mut KdDevice {
    match KinectDevice::from_config(Config::from_env()) {
        Ok(dev) => Box::into_raw(Box::new(KdDevice(dev))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Shut down and free a device.
///
/// # Safety
/// `dev` must be a pointer returned by `kd_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_free(dev: *mut KdDevice) {
    if !dev.is_null() {
        drop(Box::from_raw(dev));
    }
}

/// Open the sensor. Blocks for the warm-up period.
/// Returns 0 = ok, 1 = not available, -1 = error.
///
/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_initialize(dev: *const KdDevice) -> c_int {
    if dev.is_null() {
        return InitStatus::Error.code();
    }
    let status = (*dev).0.initialize();
    if status != InitStatus::Ok {
        LAST_ERROR.set_message(&format!("initialize: {:?}", status));
    }
    status.code()
}

/// Close the sensor.
/// Returns 0 = ok, 1 = no sensor, -2 = close failed, -1 = error.
///
/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_shutdown(dev: *const KdDevice) -> c_int {
    if dev.is_null() {
        return ShutdownStatus::Error.code();
    }
    (*dev).0.shutdown().code()
}

/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_is_initialized(dev: *const KdDevice) -> bool {
    !dev.is_null() && (*dev).0.is_initialized()
}

/// Returns 0 = available, 1 = unavailable, -1 = error.
///
/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_status(dev: *const KdDevice) -> c_int {
    if dev.is_null() {
        return DeviceStatus::Error.code();
    }
    (*dev).0.status().code()
}

/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_is_skeleton_tracked(dev: *const KdDevice) -> bool {
    !dev.is_null() && (*dev).0.is_skeleton_tracked()
}

/// Copy up to `max` joints into `out`. Returns the number written, 0 when the
/// device is not initialized, or -1 on error.
///
/// # Safety
/// `out` must point to an array of at least `max` `KdJoint` elements, or be null.
#[no_mangle]
pub unsafe extern "C" fn kd_get_tracked_joints(
    dev: *const KdDevice,
    out: *mut KdJoint,
    max: c_int,
) -> c_int {
    if dev.is_null() || max < 0 {
        return -1;
    }
    let joints = (*dev).0.tracked_joints();
    let count = joints.len().min(max as usize);
    if !out.is_null() {
        for (i, joint) in joints.iter().take(count).enumerate() {
            out.add(i).write(KdJoint {
                role: joint.role as c_int,
                position: joint.position,
                orientation: joint.orientation,
                tracking_state: joint.tracking_state as c_int,
            });
        }
    }
    count as c_int
}

/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_set_camera_enabled(dev: *const KdDevice, enabled: bool) {
    if !dev.is_null() {
        (*dev).0.set_camera_enabled(enabled);
    }
}

/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_is_camera_enabled(dev: *const KdDevice) -> bool {
    !dev.is_null() && (*dev).0.is_camera_enabled()
}

/// Report the latest color frame's geometry. Returns the frame size in bytes,
/// or 0 when no frame is available. Pixels are BGRA.
///
/// # Safety
/// `width` and `height` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_color_frame_info(
    dev: *const KdDevice,
    width: *mut c_int,
    height: *mut c_int,
) -> c_int {
    if dev.is_null() {
        return 0;
    }
    let info = (*dev)
        .0
        .with_color_frame(|f| (f.width as c_int, f.height as c_int, f.data.len()));
    let Some((w, h, len)) = info else {
        return 0;
    };
    if !width.is_null() {
        width.write(w);
    }
    if !height.is_null() {
        height.write(h);
    }
    len as c_int
}

/// Copy the latest color frame into `out`. Returns bytes written, 0 when no
/// frame is available, or -1 if `len` is too small.
///
/// # Safety
/// `out` must point to at least `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn kd_copy_color_frame(dev: *const KdDevice, out: *mut u8, len: usize) -> c_int {
    if dev.is_null() || out.is_null() {
        return -1;
    }
    let copied = (*dev).0.with_color_frame(|f| {
        if f.data.len() > len {
            return Err(f.data.len());
        }
        std::ptr::copy_nonoverlapping(f.data.as_ptr(), out, f.data.len());
        Ok(f.data.len())
    });
    match copied {
        Some(Ok(n)) => n as c_int,
        Some(Err(needed)) => {
            LAST_ERROR.set_message(&format!(
                "color buffer too small: need {} bytes, got {}",
                needed, len
            ));
            -1
        }
        None => 0,
    }
}

/// Project a sensor-space point onto the color image. Writes (-1, -1) when
/// the point cannot be mapped.
///
/// # Safety
/// `u` and `v` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_map_point_to_image(
    dev: *const KdDevice,
    x: f32,
    y: f32,
    z: f32,
    u: *mut c_int,
    v: *mut c_int,
) {
    let (pu, pv) = if dev.is_null() {
        crate::mapper::UNKNOWN_POINT
    } else {
        (*dev).0.map_point_to_image(x, y, z)
    };
    if !u.is_null() {
        u.write(pu);
    }
    if !v.is_null() {
        v.write(pv);
    }
}

/// Native joint index for a host joint role, or -1 for the manual role and
/// out-of-range values.
#[no_mangle]
pub extern "C" fn kd_joint_native_index(role: c_int) -> c_int {
    match joints::native_index(role) {
        Ok(index) => index as c_int,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Register the availability-changed callback, replacing any previous one.
/// Pass NULL to remove it.
///
/// # Safety
/// `dev` must be a valid device pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn kd_register_status_changed_callback(
    dev: *const KdDevice,
    callback: Option<KdStatusCallback>,
) {
    if dev.is_null() {
        return;
    }
    match callback {
        Some(cb) => (*dev).0.set_status_changed_callback(move |available| cb(available as c_int)),
        None => (*dev).0.clear_status_changed_callback(),
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next kinect-device API call.
#[no_mangle]
pub extern "C" fn kd_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
