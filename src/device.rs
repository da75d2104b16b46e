use crate::color::ColorBufferStore;
use crate::config::{Backend, Config};
use crate::mapper::{self, UNKNOWN_POINT};
use crate::native::{EventHandle, MultiSourceReader, NoDeviceProvider, Sensor, SensorProvider};
use crate::notify::StatusNotifier;
use crate::poller::Poller;
use crate::sim::SimulatedDevice;
use crate::skeleton::SkeletonStore;
use crate::types::{
    ColorFrame, ColorFrameRef, DeviceStatus, FrameSources, InitStatus, JointSample, ShutdownStatus,
};
use crate::{KinectError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Frame rate of the synthetic stream used by [`Backend::Simulated`].
const SIMULATED_FPS: u32 = 30;

/// Native resources held between a successful initialize and shutdown.
pub(crate) struct Session {
    pub(crate) sensor: Box<dyn Sensor>,
    pub(crate) reader: Option<Box<dyn MultiSourceReader>>,
    pub(crate) availability: Option<EventHandle<bool>>,
    pub(crate) frame_arrived: Option<EventHandle<()>>,
    /// Set when a shutdown failed part way. The session is kept only so a
    /// later shutdown or initialize can finish releasing it.
    pub(crate) torn_down: bool,
}

impl Session {
    fn subscribe(&mut self) -> Result<()> {
        self.availability = Some(self.sensor.subscribe_is_available_changed()?);
        let reader = self
            .reader
            .insert(self.sensor.open_multi_source_reader(FrameSources::BODY | FrameSources::COLOR)?);
        self.frame_arrived = Some(reader.subscribe_frame_arrived()?);
        Ok(())
    }

    /// Release every subscription. Handles the driver already tore down are
    /// treated as released; any other failure is returned.
    ///
    /// A handle is only dropped once its unsubscribe went through, so a
    /// retry after a failure releases whatever is still subscribed.
    fn unsubscribe_all(&mut self) -> Result<()> {
        let frame_arrived = self.frame_arrived.as_ref();
        if let (Some(handle), Some(reader)) = (frame_arrived, self.reader.as_mut()) {
            absorb_teardown_race("frame-arrived", reader.unsubscribe_frame_arrived(handle))?;
        }
        self.frame_arrived = None;
        self.reader = None;

        if let Some(handle) = self.availability.as_ref() {
            absorb_teardown_race(
                "availability-changed",
                self.sensor.unsubscribe_is_available_changed(handle),
            )?;
        }
        self.availability = None;
        Ok(())
    }

    fn close(mut self) -> Result<()> {
        self.reader = None;
        self.sensor.close()
    }
}

fn absorb_teardown_race(what: &str, result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_teardown_race() => {
            log::warn!("{} handle already released by the driver: {}", what, e);
            Ok(())
        }
        other => other,
    }
}

/// State shared between the host-facing API and the polling thread.
pub(crate) struct DeviceState {
    pub(crate) config: Config,
    /// True between a successful initialize and shutdown, or until the sensor
    /// reports itself unavailable.
    pub(crate) initialized: AtomicBool,
    pub(crate) camera_enabled: AtomicBool,
    pub(crate) session: Mutex<Option<Session>>,
    pub(crate) skeleton: SkeletonStore,
    pub(crate) color: ColorBufferStore,
    pub(crate) notifier: StatusNotifier,
}

/// Poll-friendly front end for one body-tracking sensor.
///
/// Owns the sensor for as long as it is initialized and runs one background
/// thread that turns the sensor's events into snapshots the host can read at
/// its own pace:
///
/// ```no_run
/// use kinect_device::{Config, KinectDevice, InitStatus};
///
/// let device = KinectDevice::from_config(Config::from_env()).unwrap();
/// if device.initialize() == InitStatus::Ok {
///     for joint in device.tracked_joints() {
///         println!("{:?} {:?}", joint.role, joint.position);
///     }
///     device.shutdown();
/// }
/// ```
pub struct KinectDevice {
    provider: Box<dyn SensorProvider>,
    state: Arc<DeviceState>,
    /// Serialises initialize/shutdown.
    lifecycle: Mutex<()>,
    poller: Mutex<Option<Poller>>,
}

impl KinectDevice {
    /// Build a device around `provider`. Nothing is opened until
    /// [`initialize`](Self::initialize).
    pub fn new(config: Config, provider: impl SensorProvider + 'static) -> KinectDevice {
        let camera_enabled = config.camera_enabled;
        KinectDevice {
            provider: Box::new(provider),
            state: Arc::new(DeviceState {
                config,
                initialized: AtomicBool::new(false),
                camera_enabled: AtomicBool::new(camera_enabled),
                session: Mutex::new(None),
                skeleton: SkeletonStore::new(),
                color: ColorBufferStore::new(),
                notifier: StatusNotifier::new(),
            }),
            lifecycle: Mutex::new(()),
            poller: Mutex::new(None),
        }
    }

    /// Build a device with the driver selected by `config.backend`.
    pub fn from_config(config: Config) -> Result<KinectDevice> {
        Ok(match config.backend {
            Backend::None => KinectDevice::new(config, NoDeviceProvider),
            Backend::Simulated => {
                let sim = SimulatedDevice::with_synthetic_stream(SIMULATED_FPS)?;
                KinectDevice::new(config, sim)
            }
        })
    }

    /// Configuration the device was built with.
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Acquire and open the sensor and subscribe to its events.
    ///
    /// Blocks the caller for the configured warm-up period. Starts the
    /// polling thread on first success and reuses it afterwards.
    pub fn initialize(&self) -> InitStatus {
        let _guard = self.lifecycle.lock();

        {
            let mut slot = self.state.session.lock();
            let live = slot.as_ref().is_some_and(|s| !s.torn_down);
            if live && self.state.initialized.load(Ordering::SeqCst) {
                log::debug!("Sensor already initialized");
                return InitStatus::Ok;
            }
            if let Some(mut stale) = slot.take() {
                log::info!("Releasing stale session before re-initializing");
                if let Err(e) = stale.unsubscribe_all().and_then(|_| stale.close()) {
                    log::warn!("Failed to release stale session: {}", e);
                }
            }
        }

        let session = match self.open_session() {
            Ok(session) => session,
            Err(
                e @ (KinectError::DeviceNotFound
                | KinectError::OpenFailed(_)
                | KinectError::NotAvailable),
            ) => {
                log::info!("Sensor not available: {}", e);
                return InitStatus::NotAvailable;
            }
            Err(e) => {
                log::error!("Sensor initialization failed: {}", e);
                return InitStatus::Error;
            }
        };

        if let Err(e) = self.ensure_poller() {
            log::error!("{}", e);
            release_quietly(session);
            return InitStatus::Error;
        }

        let mut slot = self.state.session.lock();
        *slot = Some(session);
        self.state.initialized.store(true, Ordering::SeqCst);
        log::info!("Sensor initialized");
        InitStatus::Ok
    }

    fn open_session(&self) -> Result<Session> {
        let mut sensor = self.provider.open_default()?;
        sensor.open()?;

        // The sensor needs time after opening before it reports availability.
        if !self.state.config.warmup.is_zero() {
            std::thread::sleep(self.state.config.warmup);
        }

        match sensor.is_available() {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = sensor.close() {
                    log::warn!("Failed to close unavailable sensor: {}", e);
                }
                return Err(KinectError::NotAvailable);
            }
            Err(e) => {
                let _ = sensor.close();
                return Err(e);
            }
        }

        let mut session = Session {
            sensor,
            reader: None,
            availability: None,
            frame_arrived: None,
            torn_down: false,
        };
        if let Err(e) = session.subscribe() {
            release_quietly(session);
            return Err(e);
        }
        Ok(session)
    }

    fn ensure_poller(&self) -> Result<()> {
        let mut poller = self.poller.lock();
        if poller.is_none() {
            *poller = Some(Poller::start(self.state.clone())?);
        }
        Ok(())
    }

    /// Unsubscribe from all events and close the sensor.
    ///
    /// The polling thread keeps running and idles until the next initialize.
    pub fn shutdown(&self) -> ShutdownStatus {
        let _guard = self.lifecycle.lock();
        let mut slot = self.state.session.lock();
        let Some(mut session) = slot.take() else {
            return ShutdownStatus::NoSensor;
        };
        self.state.initialized.store(false, Ordering::SeqCst);

        if let Err(e) = session.unsubscribe_all() {
            log::error!("Failed to unsubscribe sensor events: {}", e);
            // Keep the sensor so a later shutdown can finish the teardown. The
            // poller ignores it from here on.
            session.torn_down = true;
            *slot = Some(session);
            return ShutdownStatus::Error;
        }
        drop(slot);

        match session.close() {
            Ok(()) => {
                log::info!("Sensor shut down");
                ShutdownStatus::Ok
            }
            Err(e) => {
                log::error!("Failed to close sensor: {}", e);
                ShutdownStatus::CloseFailed
            }
        }
    }

    /// Whether the sensor is initialized and currently available.
    pub fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }

    /// Probe the live sensor's availability flag.
    pub fn status(&self) -> DeviceStatus {
        let session = self.state.session.lock();
        match session.as_ref().map(|s| s.sensor.is_available()) {
            None | Some(Ok(false)) => DeviceStatus::Unavailable,
            Some(Ok(true)) => DeviceStatus::Available,
            Some(Err(e)) => {
                log::debug!("Status probe failed: {}", e);
                DeviceStatus::Error
            }
        }
    }

    /// Whether the latest body frame had a tracked body.
    pub fn is_skeleton_tracked(&self) -> bool {
        self.is_initialized() && self.state.skeleton.is_tracked()
    }

    /// One sample per surfaced joint role, empty when not initialized.
    ///
    /// After the body is lost the last known joints are returned with
    /// [`is_skeleton_tracked`](Self::is_skeleton_tracked) false.
    pub fn tracked_joints(&self) -> Vec<JointSample> {
        if !self.is_initialized() {
            return Vec::new();
        }
        self.state.skeleton.samples()
    }

    /// Turn color frame capture on or off.
    pub fn set_camera_enabled(&self, enabled: bool) {
        self.state.camera_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether color frames are being captured.
    pub fn is_camera_enabled(&self) -> bool {
        self.state.camera_enabled.load(Ordering::SeqCst)
    }

    /// Copy of the latest BGRA color frame.
    pub fn color_frame(&self) -> Option<ColorFrame> {
        self.with_color_frame(|frame| frame.to_frame())
    }

    /// Run `f` on the latest BGRA color frame without copying it. The polling
    /// thread cannot publish a new frame while `f` runs.
    pub fn with_color_frame<R>(&self, f: impl FnOnce(ColorFrameRef<'_>) -> R) -> Option<R> {
        if !self.is_initialized() || !self.is_camera_enabled() {
            return None;
        }
        self.state.color.with_frame(f)
    }

    /// Project a sensor-space point onto the color image, or (-1, -1).
    pub fn map_point_to_image(&self, x: f32, y: f32, z: f32) -> (i32, i32) {
        let session = self.state.session.lock();
        match session.as_ref() {
            Some(session) => mapper::map_point_to_image(&*session.sensor, x, y, z),
            None => UNKNOWN_POINT,
        }
    }

    /// Register the availability-changed callback, replacing any previous one.
    ///
    /// It runs on the polling thread with the new availability flag and holds
    /// up frame processing while it runs.
    pub fn set_status_changed_callback(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.state.notifier.set(callback);
    }

    /// Remove the availability-changed callback, if any.
    pub fn clear_status_changed_callback(&self) {
        self.state.notifier.clear();
    }
}

impl Drop for KinectDevice {
    fn drop(&mut self) {
        // Join outside the lock; a callback on the polling thread may still
        // be waiting on it.
        let poller = self.poller.lock().take();
        drop(poller);
        if self.state.session.lock().is_some() {
            let status = self.shutdown();
            log::debug!("Shutdown on drop: {:?}", status);
        }
    }
}

fn release_quietly(mut session: Session) {
    if let Err(e) = session.unsubscribe_all().and_then(|_| session.close()) {
        log::warn!("Failed to release partially initialized sensor: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorImageFormat, RawColorFrame, COLOR_BUFFER_SIZE};
    use crate::joints::NativeJoint;
    use crate::native::{Body, BodyFrame, MultiSourceFrame};
    use crate::sim::{body_frame_with, synthetic_body, synthetic_color, SimController};
    use crate::types::JointRole;
    use std::time::{Duration, Instant};

    fn test_config() -> Config {
        Config {
            warmup: Duration::ZERO,
            body_wait_timeout: Duration::from_millis(200),
            color_wait_timeout: Duration::from_millis(100),
            idle_interval: Duration::from_millis(10),
            ..Config::default()
        }
    }

    fn attached_device() -> (KinectDevice, SimController) {
        let sim = SimulatedDevice::attached();
        let ctl = sim.controller();
        (KinectDevice::new(test_config(), sim), ctl)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn body_only(body: Body) -> MultiSourceFrame {
        MultiSourceFrame {
            body: Some(body_frame_with(0, body)),
            color: None,
        }
    }

    #[test]
    fn test_no_device_attached() {
        let device = KinectDevice::new(test_config(), SimulatedDevice::new());
        assert_eq!(device.initialize(), InitStatus::NotAvailable);
        assert_eq!(device.initialize().code(), 1);
        assert!(!device.is_initialized());
        assert!(device.tracked_joints().is_empty());
        assert_eq!(device.status(), DeviceStatus::Unavailable);
        assert_eq!(device.shutdown(), ShutdownStatus::NoSensor);
    }

    #[test]
    fn test_no_driver_backend() {
        let device = KinectDevice::from_config(test_config()).unwrap();
        assert_eq!(device.initialize(), InitStatus::NotAvailable);
        assert!(device.poller.lock().is_none());
    }

    #[test]
    fn test_simulated_backend_streams() {
        let config = Config {
            backend: Backend::Simulated,
            ..test_config()
        };
        let device = KinectDevice::from_config(config).unwrap();
        assert_eq!(device.initialize(), InitStatus::Ok);
        assert!(wait_until(|| device.is_skeleton_tracked()));
        let joints = device.tracked_joints();
        assert!(joints
            .iter()
            .all(|j| j.tracking_state == crate::types::TrackingState::Tracked));
        assert_eq!(device.shutdown(), ShutdownStatus::Ok);
    }

    #[test]
    fn test_joints_empty_before_initialize() {
        let (device, _ctl) = attached_device();
        assert!(device.tracked_joints().is_empty());
        assert!(!device.is_skeleton_tracked());
        assert!(device.color_frame().is_none());
    }

    #[test]
    fn test_initialize_then_shutdown_twice() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        assert!(device.is_initialized());
        assert_eq!(device.status(), DeviceStatus::Available);
        assert_eq!(ctl.subscriptions(), (1, 1));
        assert_eq!(device.tracked_joints().len(), 25);

        assert_eq!(device.shutdown(), ShutdownStatus::Ok);
        assert!(!device.is_initialized());
        assert!(!ctl.is_open());
        assert_eq!(ctl.subscriptions(), (0, 0));
        assert!(device.tracked_joints().is_empty());

        assert_eq!(device.shutdown(), ShutdownStatus::NoSensor);
        assert_eq!(device.shutdown().code(), 1);
    }

    #[test]
    fn test_unavailable_after_warmup_releases_sensor() {
        let (device, ctl) = attached_device();
        ctl.set_available(false);
        assert_eq!(device.initialize(), InitStatus::NotAvailable);
        assert!(!device.is_initialized());
        assert!(!ctl.is_open());

        ctl.set_available(true);
        assert_eq!(device.initialize(), InitStatus::Ok);
    }

    #[test]
    fn test_reinitialize_reuses_poller() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        let first = device.poller.lock().as_ref().and_then(|p| p.thread_id());

        assert_eq!(device.initialize(), InitStatus::Ok);
        assert_eq!(ctl.opens(), 1);

        assert_eq!(device.shutdown(), ShutdownStatus::Ok);
        assert_eq!(device.initialize(), InitStatus::Ok);
        let second = device.poller.lock().as_ref().and_then(|p| p.thread_id());

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(ctl.opens(), 2);
    }

    #[test]
    fn test_body_frames_publish_first_tracked() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);

        let mut frame = BodyFrame {
            bodies: vec![Body::untracked(); 6],
        };
        frame.bodies[2] = synthetic_body(42, 0.0);
        frame.bodies[4] = synthetic_body(43, 1.0);
        ctl.push_frame(MultiSourceFrame {
            body: Some(frame),
            color: None,
        });

        assert!(wait_until(|| device.is_skeleton_tracked()));
        assert_eq!(device.state.skeleton.snapshot().body_id, 42);

        let joints = device.tracked_joints();
        assert_eq!(joints.len(), 25);
        let head = joints.iter().find(|j| j.role == JointRole::Head).unwrap();
        let expected = synthetic_body(42, 0.0).joints[NativeJoint::Head.index()].position;
        assert_eq!(head.position, [expected.x, expected.y, expected.z]);
    }

    #[test]
    fn test_body_lost_keeps_last_joints() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);

        ctl.push_frame(body_only(synthetic_body(1, 0.3)));
        assert!(wait_until(|| device.is_skeleton_tracked()));
        let before = device.tracked_joints();

        ctl.push_frame(body_only(Body::untracked()));
        assert!(wait_until(|| !device.is_skeleton_tracked()));
        assert_eq!(device.tracked_joints(), before);
    }

    #[test]
    fn test_availability_edges_notify_once() {
        let (device, ctl) = attached_device();
        let (tx, rx) = crossbeam_channel::unbounded();
        device.set_status_changed_callback(move |available| {
            let _ = tx.send(available);
        });
        assert_eq!(device.initialize(), InitStatus::Ok);

        ctl.push_frame(body_only(synthetic_body(1, 0.0)));
        assert!(wait_until(|| device.is_skeleton_tracked()));
        let before = device.state.skeleton.snapshot();

        ctl.set_available(false);
        assert_eq!(rx.recv_timeout(Duration::from_secs(3)).unwrap(), false);
        assert!(!device.is_initialized());
        assert_eq!(device.status(), DeviceStatus::Unavailable);

        // Not dispatched while unavailable.
        ctl.push_frame(body_only(synthetic_body(2, 2.0)));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(device.state.skeleton.snapshot(), before);

        ctl.set_available(true);
        assert_eq!(rx.recv_timeout(Duration::from_secs(3)).unwrap(), true);
        assert!(device.is_initialized());
        assert!(wait_until(|| device.state.skeleton.snapshot().body_id == 2));

        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err(), "one notification per edge");
    }

    #[test]
    fn test_color_streaming() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);

        // Disabled: color data is ignored.
        ctl.push_frame(MultiSourceFrame {
            body: Some(body_frame_with(0, synthetic_body(1, 0.0))),
            color: Some(synthetic_color(0.0)),
        });
        assert!(wait_until(|| device.is_skeleton_tracked()));
        assert!(device.color_frame().is_none());
        assert_eq!(device.state.color.allocated(), 0);

        device.set_camera_enabled(true);
        assert!(device.is_camera_enabled());
        ctl.push_frame(MultiSourceFrame {
            body: None,
            color: Some(synthetic_color(0.1)),
        });
        assert!(wait_until(|| device.color_frame().is_some()));
        let frame = device.color_frame().unwrap();
        assert_eq!(frame.data.len(), COLOR_BUFFER_SIZE);
        assert_eq!(frame.data.len(), 1920 * 1080 * 4);
        assert_eq!((frame.width, frame.height), (1920, 1080));

        device.set_camera_enabled(false);
        assert!(device.color_frame().is_none());
        device.set_camera_enabled(true);

        let bgra = RawColorFrame {
            width: 1920,
            height: 1080,
            format: ColorImageFormat::Bgra,
            data: vec![7; COLOR_BUFFER_SIZE],
        };
        ctl.push_frame(MultiSourceFrame {
            body: None,
            color: Some(bgra),
        });
        assert!(wait_until(|| device
            .with_color_frame(|f| f.data[0] == 7)
            .unwrap_or(false)));
        assert_eq!(device.state.color.reallocations(), 1);
    }

    #[test]
    fn test_map_point_to_image() {
        let (device, _ctl) = attached_device();
        assert_eq!(device.map_point_to_image(0.0, 0.0, 2.0), (-1, -1));

        assert_eq!(device.initialize(), InitStatus::Ok);
        assert_eq!(device.map_point_to_image(0.0, 0.0, 2.0), (959, 539));
        assert_eq!(
            device.map_point_to_image(0.3, -0.2, -5.0),
            device.map_point_to_image(0.3, -0.2, 0.1)
        );
        assert_eq!(device.map_point_to_image(0.0, 0.0, 0.0), (-1, -1));
        assert_eq!(device.map_point_to_image(1.0, 0.0, 0.0), (-1, -1));
        assert_eq!(device.map_point_to_image(0.0, f32::NAN, 1.0), (-1, -1));
    }

    #[test]
    fn test_shutdown_absorbs_invalidated_handles() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        ctl.invalidate_handles();
        assert_eq!(device.shutdown(), ShutdownStatus::Ok);
        assert!(!device.is_initialized());
        assert!(!ctl.is_open());
    }

    #[test]
    fn test_fatal_unsubscribe_reports_error() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        ctl.fail_next_unsubscribe();
        assert_eq!(device.shutdown(), ShutdownStatus::Error);
        assert_eq!(ShutdownStatus::Error.code(), -1);
        assert!(!device.is_initialized());
        assert!(ctl.is_open());
        assert_eq!(ctl.subscriptions(), (1, 1));

        // A retry finishes releasing what is left.
        assert_eq!(device.shutdown(), ShutdownStatus::Ok);
        assert!(!ctl.is_open());
        assert_eq!(ctl.subscriptions(), (0, 0));
    }

    #[test]
    fn test_retry_after_fatal_unsubscribe_releases_subscriptions() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        ctl.fail_next_unsubscribe();
        assert_eq!(device.shutdown(), ShutdownStatus::Error);

        ctl.fail_next_close();
        assert_eq!(device.shutdown(), ShutdownStatus::CloseFailed);
        assert_eq!(ctl.subscriptions(), (0, 0));
    }

    #[test]
    fn test_availability_does_not_revive_failed_shutdown() {
        let (device, ctl) = attached_device();
        let (tx, rx) = crossbeam_channel::unbounded();
        device.set_status_changed_callback(move |available| {
            let _ = tx.send(available);
        });
        assert_eq!(device.initialize(), InitStatus::Ok);
        ctl.fail_next_unsubscribe();
        assert_eq!(device.shutdown(), ShutdownStatus::Error);

        ctl.set_available(false);
        ctl.set_available(true);
        std::thread::sleep(Duration::from_millis(100));
        assert!(!device.is_initialized());
        assert!(rx.try_recv().is_err());

        // Initialize releases the leftover session and opens a fresh one.
        assert_eq!(device.initialize(), InitStatus::Ok);
        assert_eq!(ctl.opens(), 2);
        assert_eq!(ctl.subscriptions(), (1, 1));
        ctl.push_frame(body_only(synthetic_body(5, 0.0)));
        assert!(wait_until(|| device.is_skeleton_tracked()));
        assert_eq!(device.state.skeleton.snapshot().body_id, 5);
    }

    #[test]
    fn test_poller_survives_invalidated_handles() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        let before = device.poller.lock().as_ref().and_then(|p| p.thread_id());

        ctl.invalidate_handles();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(device.shutdown(), ShutdownStatus::Ok);

        ctl.attach();
        assert_eq!(device.initialize(), InitStatus::Ok);
        let after = device.poller.lock().as_ref().and_then(|p| p.thread_id());
        assert_eq!(before, after);

        ctl.push_frame(body_only(synthetic_body(9, 0.0)));
        assert!(wait_until(|| device.is_skeleton_tracked()));
        assert_eq!(device.state.skeleton.snapshot().body_id, 9);
    }

    #[test]
    fn test_failed_acquire_skips_one_frame() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);

        ctl.fail_next_acquire();
        ctl.push_frame(body_only(synthetic_body(1, 0.0)));
        assert!(wait_until(|| !ctl.acquire_failure_pending()));
        std::thread::sleep(Duration::from_millis(50));
        assert!(!device.is_skeleton_tracked());

        ctl.push_frame(body_only(synthetic_body(2, 0.0)));
        assert!(wait_until(|| device.is_skeleton_tracked()));
        assert_eq!(device.state.skeleton.snapshot().body_id, 2);
    }

    #[test]
    fn test_map_point_follows_live_calibration() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        assert_eq!(device.map_point_to_image(0.0, 0.0, 2.0), (959, 539));

        ctl.set_intrinsics(crate::mapper::Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 100.0,
            cy: 50.0,
        });
        assert_eq!(device.map_point_to_image(0.0, 0.0, 2.0), (100, 50));
        assert_eq!(device.map_point_to_image(1.0, 1.0, 2.0), (350, -200));

        ctl.fail_projection(true);
        assert_eq!(device.map_point_to_image(0.0, 0.0, 2.0), (-1, -1));
        ctl.fail_projection(false);
        assert_eq!(device.map_point_to_image(0.0, 0.0, 2.0), (100, 50));
    }

    #[test]
    fn test_close_failure() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        ctl.fail_next_close();
        assert_eq!(device.shutdown(), ShutdownStatus::CloseFailed);
        assert_eq!(device.shutdown(), ShutdownStatus::NoSensor);
        assert_eq!(device.initialize(), InitStatus::Ok);
    }

    #[test]
    fn test_drop_releases_sensor() {
        let (device, ctl) = attached_device();
        assert_eq!(device.initialize(), InitStatus::Ok);
        drop(device);
        assert!(!ctl.is_open());
        assert_eq!(ctl.subscriptions(), (0, 0));
    }

    #[test]
    fn test_unplug_mid_session() {
        let (device, ctl) = attached_device();
        let (tx, rx) = crossbeam_channel::unbounded();
        device.set_status_changed_callback(move |available| {
            let _ = tx.send(available);
        });
        assert_eq!(device.initialize(), InitStatus::Ok);

        ctl.detach();
        assert_eq!(rx.recv_timeout(Duration::from_secs(3)).unwrap(), false);
        assert!(!device.is_initialized());
        assert_eq!(device.shutdown(), ShutdownStatus::Ok);
        assert_eq!(device.initialize(), InitStatus::NotAvailable);
    }
}
