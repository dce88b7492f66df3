//! Configuration file handling for camwatch.
//!
//! Loads configuration from `<config dir>/camwatch/config.toml` or a custom
//! path. Every field is optional; missing ones take the built-in defaults.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::camera::{
    AttemptBudget, Backoff, BudgetScope, DeviceId, PolicyError, ReconnectPolicy, Resolution,
    StreamSettings, DEFAULT_BACKOFF_MAX,
};
use crate::capture_loop::LoopConfig;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub camera: CameraConfig,
    pub reconnect: ReconnectConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Index (`0`) or path/URL (`"/dev/video2"`, `"stub://ok"`)
    #[serde(deserialize_with = "deserialize_device")]
    pub device: DeviceId,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffer_size: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let stream = StreamSettings::default();
        Self {
            device: DeviceId::default(),
            width: stream.resolution.width,
            height: stream.resolution.height,
            fps: stream.fps,
            buffer_size: stream.buffer_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Connection attempts in `start()`; -1 retries forever
    pub max_attempts: i64,
    pub budget_scope: BudgetScope,
    pub delay_secs: f64,
    pub backoff: BackoffKind,
    pub backoff_max_secs: f64,
    pub connection_timeout_secs: f64,
    pub frame_timeout_secs: f64,
    pub max_failed_frames: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            max_attempts: -1,
            budget_scope: policy.budget_scope,
            delay_secs: policy.reconnect_delay.as_secs_f64(),
            backoff: BackoffKind::Fixed,
            backoff_max_secs: DEFAULT_BACKOFF_MAX.as_secs_f64(),
            connection_timeout_secs: policy.connection_timeout.as_secs_f64(),
            frame_timeout_secs: policy.frame_timeout.as_secs_f64(),
            max_failed_frames: policy.max_failed_frames,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub tick_ms: u64,
    pub disconnected_poll_ms: u64,
    pub error_pause_ms: u64,
    pub status_interval_secs: f64,
    pub report_every: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let pacing = LoopConfig::default();
        Self {
            tick_ms: pacing.tick.as_millis() as u64,
            disconnected_poll_ms: pacing.disconnected_poll.as_millis() as u64,
            error_pause_ms: pacing.error_pause.as_millis() as u64,
            status_interval_secs: pacing.status_interval.as_secs_f64(),
            report_every: pacing.report_every,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDevice {
    Index(u32),
    Name(String),
}

fn deserialize_device<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DeviceId, D::Error> {
    match RawDevice::deserialize(deserializer)? {
        RawDevice::Index(index) => Ok(DeviceId::Index(index)),
        RawDevice::Name(name) => name.parse().map_err(serde::de::Error::custom),
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Invalid reconnect policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Commented template written by `camwatch config init`.
pub const DEFAULT_CONFIG: &str = r#"# camwatch configuration

[camera]
# Device index, device path, or stub:// URL (stub://ok, stub://flaky, stub://unplug)
device = 0
width = 640
height = 480
fps = 30
# Driver-side frame queue depth (1 = lowest latency)
buffer_size = 1

[reconnect]
# Connection attempts at startup (-1 = retry forever)
max_attempts = -1
# "startup": the attempt limit applies only at startup
# "always": it also applies after the camera is lost
budget_scope = "startup"
# Minimum seconds between connection attempts
delay_secs = 2.0
# "fixed" or "exponential" (startup retries only)
backoff = "fixed"
backoff_max_secs = 30.0
connection_timeout_secs = 5.0
frame_timeout_secs = 1.0
# Consecutive empty reads before the camera is considered lost
max_failed_frames = 5

[runtime]
tick_ms = 33
disconnected_poll_ms = 100
error_pause_ms = 1000
status_interval_secs = 5.0
# Log FPS and detections every N frames
report_every = 30
"#;

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            Self::parse(&content).map_err(|e| ConfigError::Parse { path, source: e })
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Load from a path given on the command line. The file must exist.
    pub fn load_from_explicit(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            resolution: Resolution {
                width: self.camera.width,
                height: self.camera.height,
            },
            fps: self.camera.fps,
            buffer_size: self.camera.buffer_size,
        }
    }

    /// Build and validate the session policy.
    pub fn policy(&self) -> Result<ReconnectPolicy, ConfigError> {
        let r = &self.reconnect;
        let policy = ReconnectPolicy {
            attempts: AttemptBudget::from_count(r.max_attempts),
            budget_scope: r.budget_scope,
            backoff: match r.backoff {
                BackoffKind::Fixed => Backoff::Fixed,
                BackoffKind::Exponential => Backoff::Exponential {
                    max: secs("reconnect.backoff_max_secs", r.backoff_max_secs)?,
                },
            },
            reconnect_delay: secs("reconnect.delay_secs", r.delay_secs)?,
            connection_timeout: secs(
                "reconnect.connection_timeout_secs",
                r.connection_timeout_secs,
            )?,
            frame_timeout: secs("reconnect.frame_timeout_secs", r.frame_timeout_secs)?,
            max_failed_frames: r.max_failed_frames,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn loop_config(&self) -> Result<LoopConfig, ConfigError> {
        let rt = &self.runtime;
        Ok(LoopConfig {
            tick: Duration::from_millis(rt.tick_ms),
            disconnected_poll: Duration::from_millis(rt.disconnected_poll_ms),
            error_pause: Duration::from_millis(rt.error_pause_ms),
            status_interval: secs("runtime.status_interval_secs", rt.status_interval_secs)?,
            report_every: rt.report_every,
            max_frames: None,
        })
    }
}

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("camwatch").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/camwatch/config.toml")
        })
}
