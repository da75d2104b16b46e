use std::time::Duration;

/// Which sensor driver [`crate::KinectDevice::from_config`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// No driver: every initialize reports the sensor as not available.
    None,
    /// Synthetic sensor streaming a moving skeleton and a test pattern.
    Simulated,
}

/// Runtime settings of a [`crate::KinectDevice`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Pause after opening the sensor before checking availability.
    pub warmup: Duration,
    /// Bounded frame wait when color streaming is off.
    pub body_wait_timeout: Duration,
    /// Bounded frame wait when color streaming is on.
    pub color_wait_timeout: Duration,
    /// Pause per polling iteration while the sensor is not initialized.
    pub idle_interval: Duration,
    pub camera_enabled: bool,
    pub backend: Backend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(2),
            body_wait_timeout: Duration::from_secs(3),
            color_wait_timeout: Duration::from_millis(500),
            idle_interval: Duration::from_millis(100),
            camera_enabled: false,
            backend: Backend::None,
        }
    }
}

impl Config {
    /// Defaults overridden by `KINECT_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        let backend = match read_env_string("KINECT_BACKEND", "none").as_str() {
            "none" => Backend::None,
            "sim" | "simulated" => Backend::Simulated,
            other => {
                log::warn!("Unknown KINECT_BACKEND='{}', using none (supported: none|sim)", other);
                Backend::None
            }
        };

        Self {
            warmup: read_env_ms("KINECT_WARMUP_MS", d.warmup),
            body_wait_timeout: read_env_ms("KINECT_BODY_WAIT_MS", d.body_wait_timeout),
            color_wait_timeout: read_env_ms("KINECT_COLOR_WAIT_MS", d.color_wait_timeout),
            idle_interval: read_env_ms("KINECT_IDLE_MS", d.idle_interval),
            camera_enabled: read_env_bool("KINECT_CAMERA_ENABLED", d.camera_enabled),
            backend,
        }
    }

    /// Frame wait for the current streaming mode.
    pub fn wait_timeout(&self, camera_enabled: bool) -> Duration {
        if camera_enabled {
            self.color_wait_timeout
        } else {
            self.body_wait_timeout
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => parse_bool(&v).unwrap_or_else(|| {
            log::warn!("Ignoring {}='{}': expected a boolean", name, v);
            default
        }),
        Err(_) => default,
    }
}

fn read_env_ms(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .unwrap_or_else(|_| {
                log::warn!("Ignoring {}='{}': expected milliseconds", name, v);
                default
            }),
        Err(_) => default,
    }
}

fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
