//! Programmable devices for exercising sessions without hardware.
//!
//! Each [`DeviceId`] gets a [`Script`]: a queue of open outcomes and a queue
//! of read outcomes. Reads are consumed per device, across handles, so a
//! script describes what the physical camera does over time regardless of
//! how often the session reopens it. When a queue runs dry its "forever"
//! default applies.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::device::{CameraDevice, DeviceOpener};
use super::types::{CameraError, DeviceId, Frame, Resolution, StreamSettings};

/// What a single read does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame,
    NoFrame,
    Fault,
}

/// Timeline for one device.
#[derive(Debug, Clone)]
pub struct Script {
    opens: VecDeque<bool>,
    reads: VecDeque<ReadOutcome>,
    open_default: bool,
    read_default: ReadOutcome,
}

impl Script {
    /// Opens fail and reads deliver frames unless told otherwise.
    pub fn new() -> Self {
        Self {
            opens: VecDeque::new(),
            reads: VecDeque::new(),
            open_default: false,
            read_default: ReadOutcome::Frame,
        }
    }

    /// Always opens, always delivers.
    pub fn healthy() -> Self {
        Self::new().open_ok_forever()
    }

    /// Never opens.
    pub fn absent() -> Self {
        Self::new()
    }

    pub fn open_ok(mut self) -> Self {
        self.opens.push_back(true);
        self
    }

    pub fn open_fail(mut self) -> Self {
        self.opens.push_back(false);
        self
    }

    pub fn open_ok_forever(mut self) -> Self {
        self.open_default = true;
        self
    }

    pub fn read(mut self, outcome: ReadOutcome) -> Self {
        self.reads.push_back(outcome);
        self
    }

    pub fn reads(mut self, count: usize, outcome: ReadOutcome) -> Self {
        self.reads.extend(std::iter::repeat(outcome).take(count));
        self
    }

    pub fn read_none_forever(mut self) -> Self {
        self.read_default = ReadOutcome::NoFrame;
        self
    }

    fn next_open(&mut self) -> bool {
        self.opens.pop_front().unwrap_or(self.open_default)
    }

    fn next_read(&mut self) -> ReadOutcome {
        self.reads.pop_front().unwrap_or(self.read_default)
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct Shared {
    scripts: HashMap<DeviceId, Script>,
    open_calls: HashMap<DeviceId, u32>,
    read_calls: u32,
    live: usize,
    max_live: usize,
}

/// Opener whose devices follow their scripts. Clones share state, so a test
/// can keep one clone for assertions while a session owns the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOpener {
    shared: Arc<Mutex<Shared>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the script for `id`.
    pub fn script(&self, id: DeviceId, script: Script) {
        lock(&self.shared).scripts.insert(id, script);
    }

    /// Queue more read outcomes for `id`.
    pub fn push_reads(&self, id: &DeviceId, count: usize, outcome: ReadOutcome) {
        if let Some(script) = lock(&self.shared).scripts.get_mut(id) {
            script.reads.extend(std::iter::repeat(outcome).take(count));
        }
    }

    /// Change whether future opens of `id` succeed once the open queue is empty.
    pub fn set_openable(&self, id: &DeviceId, openable: bool) {
        if let Some(script) = lock(&self.shared).scripts.get_mut(id) {
            script.open_default = openable;
        }
    }

    /// Number of open calls made for `id`.
    pub fn open_calls(&self, id: &DeviceId) -> u32 {
        lock(&self.shared).open_calls.get(id).copied().unwrap_or(0)
    }

    /// Reads issued against any handle.
    pub fn read_calls(&self) -> u32 {
        lock(&self.shared).read_calls
    }

    /// Handles currently open and not yet released.
    pub fn live_handles(&self) -> usize {
        lock(&self.shared).live
    }

    /// Highest number of simultaneously open handles seen.
    pub fn max_live_handles(&self) -> usize {
        lock(&self.shared).max_live
    }
}

impl DeviceOpener for ScriptedOpener {
    type Device = ScriptedDevice;

    fn open(
        &mut self,
        id: &DeviceId,
        settings: &StreamSettings,
        _timeout: Duration,
    ) -> Result<ScriptedDevice, CameraError> {
        let mut shared = lock(&self.shared);
        *shared.open_calls.entry(id.clone()).or_insert(0) += 1;
        let opened = match shared.scripts.get_mut(id) {
            Some(script) => script.next_open(),
            None => return Err(CameraError::DeviceNotFound(id.clone())),
        };
        if !opened {
            return Err(CameraError::OpenFailed(format!("camera {} is unplugged", id)));
        }
        shared.live += 1;
        shared.max_live = shared.max_live.max(shared.live);
        Ok(ScriptedDevice {
            id: id.clone(),
            resolution: settings.resolution,
            shared: Arc::clone(&self.shared),
            released: false,
        })
    }
}

/// Handle produced by [`ScriptedOpener`].
#[derive(Debug)]
pub struct ScriptedDevice {
    id: DeviceId,
    resolution: Resolution,
    shared: Arc<Mutex<Shared>>,
    released: bool,
}

impl CameraDevice for ScriptedDevice {
    fn read(&mut self, _timeout: Duration) -> Result<Option<Frame>, CameraError> {
        if self.released {
            return Err(CameraError::ReadFailed("handle already released".to_string()));
        }
        let mut shared = lock(&self.shared);
        shared.read_calls += 1;
        let outcome = shared
            .scripts
            .get_mut(&self.id)
            .map(Script::next_read)
            .unwrap_or(ReadOutcome::Fault);
        match outcome {
            ReadOutcome::Frame => Ok(Some(Frame::solid(
                self.resolution.width,
                self.resolution.height,
                [0, 0, 0],
            ))),
            ReadOutcome::NoFrame => Ok(None),
            ReadOutcome::Fault => Err(CameraError::ReadFailed("scripted fault".to_string())),
        }
    }

    fn resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            lock(&self.shared).live -= 1;
        }
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_device_not_found() {
        let mut opener = ScriptedOpener::new();
        let result = opener.open(
            &DeviceId::Index(9),
            &StreamSettings::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_reads_follow_script_across_handles() {
        let mut opener = ScriptedOpener::new();
        let id = DeviceId::Index(0);
        opener.script(
            id.clone(),
            Script::healthy()
                .read(ReadOutcome::NoFrame)
                .read(ReadOutcome::Fault),
        );
        let settings = StreamSettings::default();
        let timeout = Duration::from_millis(5);

        let mut first = opener.open(&id, &settings, timeout).unwrap();
        assert!(first.read(timeout).unwrap().is_none());
        drop(first);

        let mut second = opener.open(&id, &settings, timeout).unwrap();
        assert!(second.read(timeout).is_err());
        assert!(second.read(timeout).unwrap().is_some());
        assert_eq!(opener.open_calls(&id), 2);
        assert_eq!(opener.live_handles(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut opener = ScriptedOpener::new();
        let id = DeviceId::Index(0);
        opener.script(id.clone(), Script::healthy());
        let mut device = opener
            .open(&id, &StreamSettings::default(), Duration::from_secs(1))
            .unwrap();
        device.release();
        device.release();
        drop(device);
        assert_eq!(opener.live_handles(), 0);
    }
}
