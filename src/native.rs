//! Seam between the lifecycle manager and a sensor driver.
//!
//! A driver exposes the sensor through [`SensorProvider`], [`Sensor`] and
//! [`MultiSourceReader`]. Events are delivered through [`EventHandle`]s: the
//! driver keeps the sending half and signals it whenever the event fires.
//! Dropping the sending half (driver teardown, device unplug) makes every wait
//! on the handle return immediately.

use crate::color::RawColorFrame;
use crate::joints::JOINT_COUNT;
use crate::types::{FrameSources, TrackingState};
use crate::{KinectError, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use std::time::Duration;

/// Sensor-space point in meters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Color-image point in pixels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorPoint {
    pub x: f32,
    pub y: f32,
}

/// A joint as the sensor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawJoint {
    pub position: CameraPoint,
    pub tracking_state: TrackingState,
}

/// One body slot of a body frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub tracking_id: u64,
    pub is_tracked: bool,
    pub joints: [RawJoint; JOINT_COUNT],
    /// Joint orientations as [x, y, z, w].
    pub orientations: [[f32; 4]; JOINT_COUNT],
}

impl Body {
    /// An empty, untracked slot.
    pub fn untracked() -> Self {
        Self {
            tracking_id: 0,
            is_tracked: false,
            joints: [RawJoint::default(); JOINT_COUNT],
            orientations: [[0.0, 0.0, 0.0, 1.0]; JOINT_COUNT],
        }
    }
}

/// All body slots captured at one instant.
#[derive(Debug, Clone, Default)]
pub struct BodyFrame {
    pub bodies: Vec<Body>,
}

/// Body and color data tied to one capture instant.
#[derive(Debug, Clone, Default)]
pub struct MultiSourceFrame {
    pub body: Option<BodyFrame>,
    pub color: Option<RawColorFrame>,
}

/// Waitable event handle.
pub struct EventHandle<T> {
    id: u64,
    receiver: Receiver<T>,
}

impl<T> EventHandle<T> {
    pub fn new(id: u64, receiver: Receiver<T>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-blocking probe. `Ok(None)` when nothing is pending.
    pub fn poll(&self) -> Result<Option<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(KinectError::HandleInvalid),
        }
    }

    /// Block until the event fires or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => KinectError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => KinectError::HandleInvalid,
        })
    }

    /// Receiving half, for waiting on several handles with `select!`.
    pub fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }
}

impl<T> std::fmt::Debug for EventHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle").field("id", &self.id).finish()
    }
}

/// Entry point of a sensor driver.
pub trait SensorProvider: Send + Sync {
    /// Acquire the default sensor. Only one sensor may be live at a time.
    fn open_default(&self) -> Result<Box<dyn Sensor>>;
}

/// A connected sensor.
pub trait Sensor: Send {
    /// Start the sensor. It may take a while to report itself available.
    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_available(&self) -> Result<bool>;

    /// Subscribe to availability changes. Each event carries the new flag.
    fn subscribe_is_available_changed(&mut self) -> Result<EventHandle<bool>>;

    fn unsubscribe_is_available_changed(&mut self, handle: &EventHandle<bool>) -> Result<()>;

    fn open_multi_source_reader(
        &mut self,
        sources: FrameSources,
    ) -> Result<Box<dyn MultiSourceReader>>;

    /// Project a sensor-space point onto the color image using the live
    /// calibration. The result may be non-finite.
    fn map_camera_point_to_color_space(&self, point: CameraPoint) -> Result<ColorPoint>;

    /// Service the driver's event queue before waiting on its handles.
    fn pump_events(&self) {}
}

/// Reader over a combined body + color source.
pub trait MultiSourceReader: Send {
    fn subscribe_frame_arrived(&mut self) -> Result<EventHandle<()>>;

    fn unsubscribe_frame_arrived(&mut self, handle: &EventHandle<()>) -> Result<()>;

    /// Take the most recent frame, if one arrived since the last call.
    fn acquire_latest_frame(&mut self) -> Result<Option<MultiSourceFrame>>;
}

/// Provider used when no sensor driver is present.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeviceProvider;

impl SensorProvider for NoDeviceProvider {
    fn open_default(&self) -> Result<Box<dyn Sensor>> {
        Err(KinectError::DeviceNotFound)
    }
}
