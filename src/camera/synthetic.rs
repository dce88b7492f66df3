//! Synthetic `stub://` cameras.
//!
//! Lets the CLI and tests run the full session without hardware:
//!
//! - `stub://ok` delivers a moving gradient forever
//! - `stub://absent` never opens
//! - `stub://flaky?drop_every=N&drop_len=M` drops the last M reads of every N
//! - `stub://unplug?after=N&for_ms=T` stops delivering after N reads and
//!   refuses to open for T milliseconds, like a pulled USB cable

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::device::{CameraDevice, DeviceOpener};
use super::types::{CameraError, DeviceId, Frame, FrameFormat, Resolution, StreamSettings};

/// Behaviour selected by the stub URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubProfile {
    Ok,
    Absent,
    Flaky { drop_every: u64, drop_len: u64 },
    Unplug { after: u64, outage: Duration },
}

impl StubProfile {
    pub fn parse(url: &str) -> Result<Self, CameraError> {
        let invalid = || CameraError::InvalidDevice(url.to_string());
        let rest = url.strip_prefix("stub://").ok_or_else(invalid)?;
        let (kind, query) = rest.split_once('?').unwrap_or((rest, ""));

        let param = |name: &str, default: u64| -> Result<u64, CameraError> {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
                if key == name {
                    return value.parse().map_err(|_| invalid());
                }
            }
            Ok(default)
        };

        match kind {
            "" | "ok" => Ok(StubProfile::Ok),
            "absent" => Ok(StubProfile::Absent),
            "flaky" => {
                let drop_every = param("drop_every", 50)?.max(1);
                let drop_len = param("drop_len", 3)?.min(drop_every);
                Ok(StubProfile::Flaky {
                    drop_every,
                    drop_len,
                })
            }
            "unplug" => Ok(StubProfile::Unplug {
                after: param("after", 150)?,
                outage: Duration::from_millis(param("for_ms", 3000)?),
            }),
            _ => Err(invalid()),
        }
    }
}

/// Opener for `stub://` ids. Clones share the simulated cable state.
#[derive(Debug, Clone, Default)]
pub struct SyntheticOpener {
    unplugged_until: Arc<Mutex<Option<Instant>>>,
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    fn unplugged(&self) -> bool {
        self.unplugged_until
            .lock()
            .map(|until| (*until).is_some_and(|t| Instant::now() < t))
            .unwrap_or(false)
    }
}

impl DeviceOpener for SyntheticOpener {
    type Device = SyntheticDevice;

    fn open(
        &mut self,
        id: &DeviceId,
        settings: &StreamSettings,
        _timeout: Duration,
    ) -> Result<SyntheticDevice, CameraError> {
        let profile = match id {
            DeviceId::Path(path) => StubProfile::parse(path)?,
            DeviceId::Index(_) => return Err(CameraError::InvalidDevice(id.to_string())),
        };
        if profile == StubProfile::Absent {
            return Err(CameraError::DeviceNotFound(id.clone()));
        }
        if self.unplugged() {
            return Err(CameraError::OpenFailed(format!("{} is unplugged", id)));
        }
        Ok(SyntheticDevice {
            profile,
            resolution: settings.resolution,
            frame_interval: Duration::from_secs(1) / settings.fps.max(1),
            reads: 0,
            unplugged_until: Arc::clone(&self.unplugged_until),
            open: true,
        })
    }
}

/// Handle produced by [`SyntheticOpener`].
#[derive(Debug)]
pub struct SyntheticDevice {
    profile: StubProfile,
    resolution: Resolution,
    frame_interval: Duration,
    reads: u64,
    unplugged_until: Arc<Mutex<Option<Instant>>>,
    open: bool,
}

impl SyntheticDevice {
    fn delivers(&mut self) -> bool {
        let n = self.reads;
        self.reads += 1;
        match self.profile {
            StubProfile::Ok | StubProfile::Absent => true,
            StubProfile::Flaky {
                drop_every,
                drop_len,
            } => n % drop_every < drop_every - drop_len,
            StubProfile::Unplug { after, outage } => {
                if n < after {
                    return true;
                }
                if n == after {
                    if let Ok(mut until) = self.unplugged_until.lock() {
                        *until = Some(Instant::now() + outage);
                    }
                }
                false
            }
        }
    }

    fn render(&self) -> Frame {
        let Resolution { width, height } = self.resolution;
        let shift = (self.reads % 256) as u8;
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let r = ((x * 255) / width.max(1)) as u8;
                let g = ((y * 255) / height.max(1)) as u8;
                data.extend_from_slice(&[r.wrapping_add(shift), g, shift]);
            }
        }
        Frame {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }
}

impl CameraDevice for SyntheticDevice {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, CameraError> {
        if !self.open {
            return Err(CameraError::ReadFailed("device released".to_string()));
        }
        if self.delivers() {
            // Pace like a real sensor
            thread::sleep(self.frame_interval.min(timeout));
            Ok(Some(self.render()))
        } else {
            thread::sleep(timeout.min(self.frame_interval));
            Ok(None)
        }
    }

    fn resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    fn release(&mut self) {
        self.open = false;
    }
}
