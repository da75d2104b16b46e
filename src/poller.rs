use crate::device::DeviceState;
use crate::Result;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handle to the background frame-polling thread.
///
/// The thread is started once per [`crate::KinectDevice`] and survives
/// shutdown/initialize cycles; while no sensor is initialized it idles. It is
/// stopped and joined when the handle is dropped.
pub(crate) struct Poller {
    stop_flag: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Poller {
    pub(crate) fn start(state: Arc<DeviceState>) -> Result<Poller> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        // Never sent on; dropping the sender wakes every wait in the loop.
        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name("kinect-poller".into())
            .spawn(move || {
                poll_loop(&state, &wake_rx, &stop_clone);
            })?;

        Ok(Poller {
            stop_flag,
            wake: Some(wake_tx),
            thread: Some(thread),
        })
    }

    #[cfg(test)]
    pub(crate) fn thread_id(&self) -> Option<std::thread::ThreadId> {
        self.thread.as_ref().map(|t| t.thread().id())
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.wake.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_loop(state: &DeviceState, wake: &Receiver<()>, stop_flag: &AtomicBool) {
    log::info!("Frame poller started");

    while !stop_flag.load(Ordering::SeqCst) {
        poll_once(state, wake);
    }

    log::info!("Frame poller stopping (stop flag set)");
}

/// One iteration: availability probe, then at most one bounded frame wait.
fn poll_once(state: &DeviceState, wake: &Receiver<()>) {
    if let Some(available) = probe_availability(state) {
        log::info!("Sensor availability changed: available={}", available);
        state.notifier.notify(available);
    }

    let Some(frame_arrived) = frame_wait_handle(state) else {
        idle(wake, state.config.idle_interval);
        return;
    };

    let timeout = state.config.wait_timeout(state.camera_enabled.load(Ordering::SeqCst));
    crossbeam_channel::select! {
        recv(frame_arrived) -> msg => match msg {
            Ok(()) => dispatch_frame(state),
            Err(_) => {
                // Driver side of the handle is gone; wait for shutdown or an
                // availability event instead of spinning.
                log::debug!("Frame-arrived handle closed");
                idle(wake, state.config.idle_interval);
            }
        },
        recv(wake) -> _ => {}
        default(timeout) => log::trace!("No frame within {:?}", timeout),
    }
}

/// Drain one pending availability-changed event, updating the initialized
/// flag under the session lock. Probe failures are absorbed. A session left
/// behind by a failed shutdown is never revived.
fn probe_availability(state: &DeviceState) -> Option<bool> {
    let session = state.session.lock();
    let session = session.as_ref().filter(|s| !s.torn_down)?;
    let handle = session.availability.as_ref()?;
    match handle.poll() {
        Ok(Some(available)) => {
            state.initialized.store(available, Ordering::SeqCst);
            Some(available)
        }
        Ok(None) => None,
        Err(e) => {
            log::trace!("Availability probe failed: {}", e);
            None
        }
    }
}

/// The frame-arrived receiver, if the sensor is initialized and reports
/// itself available right now.
fn frame_wait_handle(state: &DeviceState) -> Option<Receiver<()>> {
    if !state.initialized.load(Ordering::SeqCst) {
        return None;
    }
    let session = state.session.lock();
    let session = session.as_ref()?;

    match session.sensor.is_available() {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            log::debug!("Availability check failed: {}", e);
            return None;
        }
    }

    session.sensor.pump_events();
    session.frame_arrived.as_ref().map(|h| h.receiver().clone())
}

/// Acquire the latest frame and publish body, then color.
fn dispatch_frame(state: &DeviceState) {
    let frame = {
        let mut session = state.session.lock();
        let Some(reader) = session.as_mut().and_then(|s| s.reader.as_mut()) else {
            return;
        };
        match reader.acquire_latest_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::trace!("Frame signalled but none pending");
                return;
            }
            Err(e) => {
                log::debug!("Failed to acquire frame: {}", e);
                return;
            }
        }
    };

    if let Some(body) = &frame.body {
        state.skeleton.apply_body_frame(body);
    }

    if state.camera_enabled.load(Ordering::SeqCst) {
        if let Some(color) = &frame.color {
            if let Err(e) = state.color.update(color) {
                log::debug!("Dropping color frame: {}", e);
            }
        }
    }
}

fn idle(wake: &Receiver<()>, interval: Duration) {
    let _ = wake.recv_timeout(interval);
}
