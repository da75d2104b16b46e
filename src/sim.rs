//! Simulated sensor driver.
//!
//! Behaves like the real sensor at the seam in [`crate::native`]: one live
//! sensor at a time, availability-changed events on every edge, an auto-reset
//! frame-arrived event and a latest-frame-wins reader. A [`SimController`]
//! drives it from tests, and [`SimulatedDevice::with_synthetic_stream`] feeds
//! it a moving skeleton for demos and hosts without hardware.

use crate::color::{ColorImageFormat, RawColorFrame, COLOR_HEIGHT, COLOR_WIDTH};
use crate::joints::{NativeJoint, BODY_COUNT, JOINT_COUNT};
use crate::mapper::Intrinsics;
use crate::native::{
    Body, BodyFrame, CameraPoint, ColorPoint, EventHandle, MultiSourceFrame, MultiSourceReader,
    Sensor, SensorProvider,
};
use crate::types::{FrameSources, TrackingState};
use crate::{KinectError, Result};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct SimState {
    attached: bool,
    available: bool,
    opened: bool,
    live_sensor: bool,
    next_handle: u64,
    availability_subs: Vec<(u64, Sender<bool>)>,
    frame_subs: Vec<(u64, Sender<()>)>,
    latest: Option<MultiSourceFrame>,
    handles_invalid: bool,
    fail_unsubscribe: bool,
    fail_close: bool,
    fail_acquire: bool,
    fail_projection: bool,
    intrinsics: Intrinsics,
    opens: u64,
}

impl SimState {
    fn handle_id(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn broadcast_availability(&mut self) {
        let available = self.attached && self.opened && self.available;
        for (_, tx) in &self.availability_subs {
            let _ = tx.try_send(available);
        }
    }

    fn drop_subscriptions(&mut self) {
        self.availability_subs.clear();
        self.frame_subs.clear();
        self.latest = None;
    }

    fn unsubscribe<T>(
        subs: &mut Vec<(u64, Sender<T>)>,
        id: u64,
        (handles_invalid, fail): (bool, bool),
    ) -> Result<()> {
        if fail {
            return Err(KinectError::Native("unsubscribe rejected by driver".into()));
        }
        if handles_invalid {
            return Err(KinectError::HandleInvalid);
        }
        let before = subs.len();
        subs.retain(|(sub, _)| *sub != id);
        if subs.len() == before {
            return Err(KinectError::HandleInvalid);
        }
        Ok(())
    }

    fn take_unsubscribe_flags(&mut self) -> (bool, bool) {
        let fail = std::mem::take(&mut self.fail_unsubscribe);
        (self.handles_invalid, fail)
    }
}

/// Test and demo handle onto a [`SimulatedDevice`].
#[derive(Clone)]
pub struct SimController {
    state: Arc<Mutex<SimState>>,
}

impl SimController {
    /// Plug the device in. It reports available once opened.
    pub fn attach(&self) {
        let mut s = self.state.lock();
        let was_available = s.attached && s.opened && s.available;
        s.attached = true;
        s.available = true;
        s.handles_invalid = false;
        if !was_available && s.opened {
            s.broadcast_availability();
        }
    }

    /// Unplug the device. Open sensors see an availability-changed event.
    pub fn detach(&self) {
        let mut s = self.state.lock();
        let was_available = s.attached && s.opened && s.available;
        s.attached = false;
        s.available = false;
        if was_available {
            s.broadcast_availability();
        }
    }

    /// Change availability, signalling subscribers only on an actual edge.
    pub fn set_available(&self, available: bool) {
        let mut s = self.state.lock();
        if s.available == available {
            return;
        }
        s.available = available;
        if s.opened && s.attached {
            s.broadcast_availability();
        }
    }

    /// Deliver a frame to open readers.
    pub fn push_frame(&self, frame: MultiSourceFrame) {
        let mut s = self.state.lock();
        if !s.opened {
            return;
        }
        s.latest = Some(frame);
        for (_, tx) in &s.frame_subs {
            let _ = tx.try_send(());
        }
    }

    /// Tear down every handle on the driver side, as an abrupt disconnect does.
    pub fn invalidate_handles(&self) {
        let mut s = self.state.lock();
        s.handles_invalid = true;
        s.drop_subscriptions();
    }

    /// Make the next unsubscribe call fail while its handle is still valid.
    pub fn fail_next_unsubscribe(&self) {
        self.state.lock().fail_unsubscribe = true;
    }

    /// Make the next close call fail.
    pub fn fail_next_close(&self) {
        self.state.lock().fail_close = true;
    }

    /// Make the next frame acquisition fail. The pending frame stays queued.
    pub fn fail_next_acquire(&self) {
        self.state.lock().fail_acquire = true;
    }

    /// Whether an armed acquisition failure has not been hit yet.
    pub fn acquire_failure_pending(&self) -> bool {
        self.state.lock().fail_acquire
    }

    /// Make coordinate mapping fail until switched off again.
    pub fn fail_projection(&self, fail: bool) {
        self.state.lock().fail_projection = fail;
    }

    /// Replace the calibration used for coordinate mapping.
    pub fn set_intrinsics(&self, intrinsics: Intrinsics) {
        self.state.lock().intrinsics = intrinsics;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().opened
    }

    /// Number of times a sensor was opened.
    pub fn opens(&self) -> u64 {
        self.state.lock().opens
    }

    /// Live (availability, frame) subscriptions.
    pub fn subscriptions(&self) -> (usize, usize) {
        let s = self.state.lock();
        (s.availability_subs.len(), s.frame_subs.len())
    }
}

/// Provider for the simulated sensor.
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
    generator: Option<Generator>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// A simulated device that starts unplugged.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                attached: false,
                available: false,
                opened: false,
                live_sensor: false,
                next_handle: 0,
                availability_subs: Vec::new(),
                frame_subs: Vec::new(),
                latest: None,
                handles_invalid: false,
                fail_unsubscribe: false,
                fail_close: false,
                fail_acquire: false,
                fail_projection: false,
                intrinsics: Intrinsics::default(),
                opens: 0,
            })),
            generator: None,
        }
    }

    /// A plugged-in device.
    pub fn attached() -> Self {
        let device = Self::new();
        device.controller().attach();
        device
    }

    /// A plugged-in device fed `fps` synthetic frames per second while open.
    pub fn with_synthetic_stream(fps: u32) -> Result<Self> {
        let mut device = Self::attached();
        device.generator = Some(Generator::start(device.controller(), fps)?);
        Ok(device)
    }

    pub fn controller(&self) -> SimController {
        SimController {
            state: self.state.clone(),
        }
    }
}

impl SensorProvider for SimulatedDevice {
    fn open_default(&self) -> Result<Box<dyn Sensor>> {
        let mut s = self.state.lock();
        if !s.attached {
            return Err(KinectError::DeviceNotFound);
        }
        if s.live_sensor {
            return Err(KinectError::SensorInUse);
        }
        s.live_sensor = true;
        Ok(Box::new(SimulatedSensor {
            state: self.state.clone(),
        }))
    }
}

struct SimulatedSensor {
    state: Arc<Mutex<SimState>>,
}

impl Sensor for SimulatedSensor {
    fn open(&mut self) -> Result<()> {
        let mut s = self.state.lock();
        if !s.attached {
            return Err(KinectError::OpenFailed("device unplugged".into()));
        }
        s.opened = true;
        s.opens += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut s = self.state.lock();
        if std::mem::take(&mut s.fail_close) {
            return Err(KinectError::Native("close rejected by driver".into()));
        }
        s.opened = false;
        s.drop_subscriptions();
        Ok(())
    }

    fn is_available(&self) -> Result<bool> {
        let s = self.state.lock();
        Ok(s.attached && s.opened && s.available)
    }

    fn subscribe_is_available_changed(&mut self) -> Result<EventHandle<bool>> {
        let mut s = self.state.lock();
        if !s.opened {
            return Err(KinectError::Subscribe("sensor not open".into()));
        }
        let id = s.handle_id();
        let (tx, rx) = crossbeam_channel::bounded(16);
        s.availability_subs.push((id, tx));
        Ok(EventHandle::new(id, rx))
    }

    fn unsubscribe_is_available_changed(&mut self, handle: &EventHandle<bool>) -> Result<()> {
        let mut s = self.state.lock();
        let flags = s.take_unsubscribe_flags();
        SimState::unsubscribe(&mut s.availability_subs, handle.id(), flags)
    }

    fn open_multi_source_reader(
        &mut self,
        sources: FrameSources,
    ) -> Result<Box<dyn MultiSourceReader>> {
        let s = self.state.lock();
        if !s.opened {
            return Err(KinectError::Reader("sensor not open".into()));
        }
        let unsupported = sources - (FrameSources::BODY | FrameSources::COLOR);
        if !unsupported.is_empty() {
            return Err(KinectError::Reader(format!("unsupported sources {:?}", unsupported)));
        }
        Ok(Box::new(SimulatedReader {
            state: self.state.clone(),
            sources,
        }))
    }

    fn map_camera_point_to_color_space(&self, point: CameraPoint) -> Result<ColorPoint> {
        let s = self.state.lock();
        if s.fail_projection {
            return Err(KinectError::Native("coordinate mapper unavailable".into()));
        }
        Ok(s.intrinsics.project(point))
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        let mut s = self.state.lock();
        s.live_sensor = false;
        s.opened = false;
    }
}

struct SimulatedReader {
    state: Arc<Mutex<SimState>>,
    sources: FrameSources,
}

impl MultiSourceReader for SimulatedReader {
    fn subscribe_frame_arrived(&mut self) -> Result<EventHandle<()>> {
        let mut s = self.state.lock();
        if !s.opened {
            return Err(KinectError::Subscribe("sensor not open".into()));
        }
        let id = s.handle_id();
        let (tx, rx) = crossbeam_channel::bounded(1);
        s.frame_subs.push((id, tx));
        Ok(EventHandle::new(id, rx))
    }

    fn unsubscribe_frame_arrived(&mut self, handle: &EventHandle<()>) -> Result<()> {
        let mut s = self.state.lock();
        let flags = s.take_unsubscribe_flags();
        SimState::unsubscribe(&mut s.frame_subs, handle.id(), flags)
    }

    fn acquire_latest_frame(&mut self) -> Result<Option<MultiSourceFrame>> {
        let mut s = self.state.lock();
        if !s.opened {
            return Err(KinectError::Reader("sensor closed".into()));
        }
        if std::mem::take(&mut s.fail_acquire) {
            return Err(KinectError::Reader("frame acquisition failed".into()));
        }
        Ok(s.latest.take().map(|mut frame| {
            if !self.sources.contains(FrameSources::BODY) {
                frame.body = None;
            }
            if !self.sources.contains(FrameSources::COLOR) {
                frame.color = None;
            }
            frame
        }))
    }
}

/// Rest pose in sensor space (meters), indexed by native joint.
fn rest_pose() -> [[f32; 3]; JOINT_COUNT] {
    let mut pose = [[0.0f32; 3]; JOINT_COUNT];
    let mut put = |joint: NativeJoint, p: [f32; 3]| pose[joint.index()] = p;
    put(NativeJoint::SpineBase, [0.0, -0.30, 2.0]);
    put(NativeJoint::SpineMid, [0.0, 0.00, 2.0]);
    put(NativeJoint::Neck, [0.0, 0.32, 2.0]);
    put(NativeJoint::Head, [0.0, 0.45, 2.0]);
    put(NativeJoint::SpineShoulder, [0.0, 0.25, 2.0]);
    put(NativeJoint::ShoulderLeft, [-0.18, 0.22, 2.0]);
    put(NativeJoint::ElbowLeft, [-0.25, -0.02, 2.0]);
    put(NativeJoint::WristLeft, [-0.28, -0.24, 1.98]);
    put(NativeJoint::HandLeft, [-0.29, -0.30, 1.97]);
    put(NativeJoint::HandTipLeft, [-0.30, -0.38, 1.97]);
    put(NativeJoint::ThumbLeft, [-0.26, -0.32, 1.94]);
    put(NativeJoint::ShoulderRight, [0.18, 0.22, 2.0]);
    put(NativeJoint::ElbowRight, [0.25, -0.02, 2.0]);
    put(NativeJoint::WristRight, [0.28, -0.24, 1.98]);
    put(NativeJoint::HandRight, [0.29, -0.30, 1.97]);
    put(NativeJoint::HandTipRight, [0.30, -0.38, 1.97]);
    put(NativeJoint::ThumbRight, [0.26, -0.32, 1.94]);
    put(NativeJoint::HipLeft, [-0.09, -0.35, 2.0]);
    put(NativeJoint::KneeLeft, [-0.10, -0.75, 2.0]);
    put(NativeJoint::AnkleLeft, [-0.10, -1.15, 2.02]);
    put(NativeJoint::FootLeft, [-0.11, -1.20, 1.90]);
    put(NativeJoint::HipRight, [0.09, -0.35, 2.0]);
    put(NativeJoint::KneeRight, [0.10, -0.75, 2.0]);
    put(NativeJoint::AnkleRight, [0.10, -1.15, 2.02]);
    put(NativeJoint::FootRight, [0.11, -1.20, 1.90]);
    pose
}

/// A tracked body swaying sideways, `t` seconds into the motion.
pub fn synthetic_body(tracking_id: u64, t: f32) -> Body {
    let sway = 0.15 * (t * std::f32::consts::TAU * 0.25).sin();
    let half_yaw = 0.5 * 0.2 * (t * std::f32::consts::TAU * 0.25).sin();
    let mut body = Body::untracked();
    body.tracking_id = tracking_id;
    body.is_tracked = true;
    for (joint, p) in body.joints.iter_mut().zip(rest_pose()) {
        joint.position = CameraPoint {
            x: p[0] + sway,
            y: p[1],
            z: p[2],
        };
        joint.tracking_state = TrackingState::Tracked;
    }
    body.orientations = [[0.0, half_yaw.sin(), 0.0, half_yaw.cos()]; JOINT_COUNT];
    body
}

/// A body frame with one tracked body in slot `slot` and empty slots around it.
pub fn body_frame_with(slot: usize, body: Body) -> BodyFrame {
    let mut bodies = vec![Body::untracked(); BODY_COUNT];
    if let Some(entry) = bodies.get_mut(slot) {
        *entry = body;
    }
    BodyFrame { bodies }
}

/// Full-resolution YUY2 test pattern: horizontal luma ramp with a bright bar
/// moving across it.
pub fn synthetic_color(t: f32) -> RawColorFrame {
    let (w, h) = (COLOR_WIDTH as usize, COLOR_HEIGHT as usize);
    let bar = ((t * 240.0) as usize) % w;
    let mut data = Vec::with_capacity(w * h * 2);
    for _ in 0..h {
        for x in (0..w).step_by(2) {
            let y = if x.abs_diff(bar) < 16 {
                235
            } else {
                16 + (x * 219 / w) as u8
            };
            data.extend_from_slice(&[y, 128, y, 128]);
        }
    }
    RawColorFrame {
        width: COLOR_WIDTH,
        height: COLOR_HEIGHT,
        format: ColorImageFormat::Yuy2,
        data,
    }
}

/// Background thread pushing synthetic frames into an open simulated sensor.
struct Generator {
    stop: Option<Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Generator {
    fn start(controller: SimController, fps: u32) -> Result<Self> {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let thread = std::thread::Builder::new()
            .name("kinect-sim".into())
            .spawn(move || {
                let epoch = Instant::now();
                log::info!("Synthetic stream started ({} fps)", fps);
                while let Err(crossbeam_channel::RecvTimeoutError::Timeout) =
                    stop_rx.recv_timeout(period)
                {
                    if !controller.is_open() {
                        continue;
                    }
                    let t = epoch.elapsed().as_secs_f32();
                    controller.push_frame(MultiSourceFrame {
                        body: Some(body_frame_with(0, synthetic_body(1, t))),
                        color: Some(synthetic_color(t)),
                    });
                }
                log::info!("Synthetic stream stopped");
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_live_sensor() {
        let device = SimulatedDevice::attached();
        let sensor = device.open_default().unwrap();
        assert!(matches!(device.open_default(), Err(KinectError::SensorInUse)));
        drop(sensor);
        assert!(device.open_default().is_ok());
    }

    #[test]
    fn test_unplugged_device_not_found() {
        let device = SimulatedDevice::new();
        assert!(matches!(device.open_default(), Err(KinectError::DeviceNotFound)));
    }

    #[test]
    fn test_availability_edges_only() {
        let device = SimulatedDevice::attached();
        let ctl = device.controller();
        let mut sensor = device.open_default().unwrap();
        sensor.open().unwrap();
        let handle = sensor.subscribe_is_available_changed().unwrap();

        ctl.set_available(true); // no edge
        assert_eq!(handle.poll().unwrap(), None);
        ctl.set_available(false);
        ctl.set_available(false);
        ctl.set_available(true);
        assert_eq!(handle.poll().unwrap(), Some(false));
        assert_eq!(handle.poll().unwrap(), Some(true));
        assert_eq!(handle.poll().unwrap(), None);
    }

    #[test]
    fn test_reader_filters_sources() {
        let device = SimulatedDevice::attached();
        let ctl = device.controller();
        let mut sensor = device.open_default().unwrap();
        sensor.open().unwrap();
        let mut reader = sensor.open_multi_source_reader(FrameSources::BODY).unwrap();
        let arrived = reader.subscribe_frame_arrived().unwrap();

        ctl.push_frame(MultiSourceFrame {
            body: Some(body_frame_with(2, synthetic_body(9, 0.0))),
            color: Some(RawColorFrame {
                width: 1,
                height: 1,
                format: ColorImageFormat::Bgra,
                data: vec![0; 4],
            }),
        });
        arrived.wait_timeout(Duration::from_millis(100)).unwrap();
        let frame = reader.acquire_latest_frame().unwrap().unwrap();
        assert!(frame.color.is_none());
        assert!(frame.body.unwrap().bodies[2].is_tracked);
        assert!(reader.acquire_latest_frame().unwrap().is_none());
    }

    #[test]
    fn test_depth_reader_rejected() {
        let device = SimulatedDevice::attached();
        let mut sensor = device.open_default().unwrap();
        sensor.open().unwrap();
        assert!(sensor
            .open_multi_source_reader(FrameSources::BODY | FrameSources::DEPTH)
            .is_err());
    }

    #[test]
    fn test_invalidated_handles() {
        let device = SimulatedDevice::attached();
        let ctl = device.controller();
        let mut sensor = device.open_default().unwrap();
        sensor.open().unwrap();
        let handle = sensor.subscribe_is_available_changed().unwrap();
        ctl.invalidate_handles();
        assert!(matches!(
            sensor.unsubscribe_is_available_changed(&handle),
            Err(KinectError::HandleInvalid)
        ));
    }

    #[test]
    fn test_synthetic_color_frame_is_full_resolution() {
        let frame = synthetic_color(0.5);
        assert_eq!(frame.data.len(), 1920 * 1080 * 2);
        assert_eq!(frame.format, ColorImageFormat::Yuy2);
    }
}
