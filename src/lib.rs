//! # kinect-device - poll-friendly body-tracking sensor access
//!
//! Wraps an event-driven body-tracking sensor behind a snapshot interface.
//! Provides:
//! - Sensor lifecycle (initialize / shutdown / availability status)
//! - A background thread that waits on the sensor's frame events and publishes
//!   the first tracked skeleton and, optionally, a 1920x1080 BGRA color frame
//! - 3D-to-color-image point projection
//! - An availability-changed callback
//! - C FFI for host binding layers
//!
//! ## Quick Start
//! ```no_run
//! use kinect_device::{Config, InitStatus, KinectDevice};
//! use std::time::Duration;
//!
//! let device = KinectDevice::from_config(Config::from_env()).unwrap();
//! device.set_status_changed_callback(|available| println!("available: {}", available));
//!
//! if device.initialize() == InitStatus::Ok {
//!     for _ in 0..100 {
//!         if device.is_skeleton_tracked() {
//!             let joints = device.tracked_joints();
//!             println!("head: {:?}", joints[0].position);
//!         }
//!         std::thread::sleep(Duration::from_millis(33));
//!     }
//!     device.shutdown();
//! }
//! ```

pub mod error;
pub mod types;
pub mod joints;
pub mod native;
pub mod color;
pub mod skeleton;
pub mod mapper;
pub mod notify;
pub mod config;
pub mod sim;
pub mod device;
mod poller;
pub mod ffi;

pub use config::{Backend, Config};
pub use device::KinectDevice;
pub use error::KinectError;
pub use types::*;

/// Result type alias for kinect-device operations.
pub type Result<T> = std::result::Result<T, KinectError>;
