//! Poll the tracked skeleton at a host-like cadence and print it.
//!
//! Usage: cargo run --example poll
//! Uses the simulated sensor unless KINECT_BACKEND is set.

use kinect_device::{Backend, Config, InitStatus, JointRole, KinectDevice};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let mut config = Config::from_env();
    if std::env::var("KINECT_BACKEND").is_err() {
        config.backend = Backend::Simulated;
    }

    let device = match KinectDevice::from_config(config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to create device: {}", e);
            std::process::exit(1);
        }
    };

    device.set_status_changed_callback(|available| {
        println!("--- sensor {} ---", if available { "available" } else { "unavailable" });
    });
    device.set_camera_enabled(true);

    println!("Initializing (warm-up {:?})...", device.config().warmup);
    match device.initialize() {
        InitStatus::Ok => {}
        other => {
            eprintln!("Sensor not ready: {:?} (code {})", other, other.code());
            std::process::exit(1);
        }
    }
    println!("Status: {:?}", device.status());

    let start = Instant::now();
    let mut polls: u64 = 0;
    while start.elapsed() < Duration::from_secs(5) {
        polls += 1;

        // Print every ~10th poll to avoid flooding the terminal
        if polls % 10 == 1 {
            let joints = device.tracked_joints();
            if let Some(head) = joints.iter().find(|j| j.role == JointRole::Head) {
                let [x, y, z] = head.position;
                let (u, v) = device.map_point_to_image(x, y, z);
                println!(
                    "tracked={:<5}  head=[{:+.3}, {:+.3}, {:+.3}]  image=({}, {})  state={:?}",
                    device.is_skeleton_tracked(),
                    x, y, z,
                    u, v,
                    head.tracking_state,
                );
            }
            if let Some((w, h, len)) =
                device.with_color_frame(|f| (f.width, f.height, f.data.len()))
            {
                println!("color: {}x{} ({} bytes BGRA)", w, h, len);
            }
        }

        std::thread::sleep(Duration::from_millis(33));
    }

    println!("Shutdown: {:?}", device.shutdown());
}
