//! Device seam driven by the session, plus stateless enumeration.

use std::time::Duration;

use super::types::{CameraError, CameraInfo, DeviceId, Frame, Resolution, StreamSettings};

/// Indices scanned by [`probe_devices`] when the caller has no preference.
pub const DEFAULT_PROBE_RANGE: u32 = 10;

/// An open capture device.
///
/// Handles are owned by exactly one session and never shared.
pub trait CameraDevice {
    /// Read one frame, waiting at most `timeout`.
    ///
    /// `Ok(None)` is the ordinary "no frame this time" outcome; `Err` is
    /// reserved for unexpected faults in the device layer.
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, CameraError>;

    /// Resolution the device actually negotiated, if known.
    fn resolution(&self) -> Option<Resolution>;

    /// Return the device to the system. Must be idempotent.
    fn release(&mut self);
}

/// Opens devices for a session.
pub trait DeviceOpener {
    type Device: CameraDevice;

    /// Open `id` with the requested stream settings, giving up after `timeout`.
    fn open(
        &mut self,
        id: &DeviceId,
        settings: &StreamSettings,
        timeout: Duration,
    ) -> Result<Self::Device, CameraError>;
}

/// List camera devices known to the operating system.
///
/// Returns an empty vector (not an error) when no cameras are present or the
/// crate was built without the native backend.
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    #[cfg(feature = "native")]
    {
        super::native::query_devices()
    }
    #[cfg(not(feature = "native"))]
    {
        Ok(Vec::new())
    }
}

/// Return the indices in `0..max_index` that open and deliver a frame.
///
/// Every probed handle is released before the next index is tried, so at most
/// one device is open at any moment.
pub fn probe_devices<O: DeviceOpener>(
    opener: &mut O,
    max_index: u32,
    settings: &StreamSettings,
    timeout: Duration,
) -> Vec<DeviceId> {
    let mut found = Vec::new();
    for index in 0..max_index {
        let id = DeviceId::Index(index);
        let mut device = match opener.open(&id, settings, timeout) {
            Ok(device) => device,
            Err(e) => {
                log::debug!("probe: camera {} unavailable: {}", id, e);
                continue;
            }
        };
        if let Ok(Some(_)) = device.read(timeout) {
            found.push(id);
        }
        device.release();
    }
    found
}
