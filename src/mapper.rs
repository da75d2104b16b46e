//! Projection of sensor-space points onto the color image.

use crate::native::{CameraPoint, ColorPoint, Sensor};

/// Depth that negative Z inputs are clamped to before projecting, in meters.
pub const MIN_DEPTH: f32 = 0.1;

/// Returned when a point cannot be projected.
pub const UNKNOWN_POINT: (i32, i32) = (-1, -1);

/// Pinhole calibration of a color camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Default for Intrinsics {
    /// Factory calibration of the 1920x1080 color camera.
    fn default() -> Self {
        Self {
            fx: 1081.37,
            fy: 1081.37,
            cx: 959.5,
            cy: 539.5,
        }
    }
}

impl Intrinsics {
    /// Raw projection. Undefined (non-finite) for z == 0.
    ///
    /// Sensor space is right-handed with +y up, image space has +y down.
    pub fn project(&self, p: CameraPoint) -> ColorPoint {
        ColorPoint {
            x: self.cx + self.fx * p.x / p.z,
            y: self.cy - self.fy * p.y / p.z,
        }
    }
}

/// Best-effort mapping of a 3D point to integer image coordinates.
///
/// Never fails: a failed or non-finite projection yields [`UNKNOWN_POINT`].
pub fn map_point_to_image(sensor: &dyn Sensor, x: f32, y: f32, z: f32) -> (i32, i32) {
    let point = CameraPoint {
        x,
        y,
        z: if z < 0.0 { MIN_DEPTH } else { z },
    };

    match sensor.map_camera_point_to_color_space(point) {
        Ok(p) if p.x.is_finite() && p.y.is_finite() => (p.x as i32, p.y as i32),
        Ok(p) => {
            log::trace!("Projection of {:?} is not finite: {:?}", point, p);
            UNKNOWN_POINT
        }
        Err(e) => {
            log::trace!("Projection of {:?} failed: {}", point, e);
            UNKNOWN_POINT
        }
    }
}
