//! Backend selection for the CLI: `stub://` ids go to the synthetic backend,
//! everything else to the native one when it is compiled in.

use std::time::Duration;

use super::device::{CameraDevice, DeviceOpener};
use super::synthetic::{SyntheticDevice, SyntheticOpener};
use super::types::{CameraError, DeviceId, Frame, Resolution, StreamSettings};

#[cfg(feature = "native")]
use super::native::{NativeDevice, NativeOpener};

/// Opener that dispatches on the device id.
#[derive(Debug, Clone, Default)]
pub struct SystemOpener {
    synthetic: SyntheticOpener,
    #[cfg(feature = "native")]
    native: NativeOpener,
}

impl SystemOpener {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Handle produced by [`SystemOpener`].
#[derive(Debug)]
pub enum SystemDevice {
    Synthetic(SyntheticDevice),
    #[cfg(feature = "native")]
    Native(NativeDevice),
}

impl DeviceOpener for SystemOpener {
    type Device = SystemDevice;

    fn open(
        &mut self,
        id: &DeviceId,
        settings: &StreamSettings,
        timeout: Duration,
    ) -> Result<SystemDevice, CameraError> {
        if id.is_stub() {
            return self
                .synthetic
                .open(id, settings, timeout)
                .map(SystemDevice::Synthetic);
        }
        #[cfg(feature = "native")]
        {
            self.native
                .open(id, settings, timeout)
                .map(SystemDevice::Native)
        }
        #[cfg(not(feature = "native"))]
        {
            Err(CameraError::BackendUnavailable(id.clone()))
        }
    }
}

impl CameraDevice for SystemDevice {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, CameraError> {
        match self {
            SystemDevice::Synthetic(device) => device.read(timeout),
            #[cfg(feature = "native")]
            SystemDevice::Native(device) => device.read(timeout),
        }
    }

    fn resolution(&self) -> Option<Resolution> {
        match self {
            SystemDevice::Synthetic(device) => device.resolution(),
            #[cfg(feature = "native")]
            SystemDevice::Native(device) => device.resolution(),
        }
    }

    fn release(&mut self) {
        match self {
            SystemDevice::Synthetic(device) => device.release(),
            #[cfg(feature = "native")]
            SystemDevice::Native(device) => device.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_ids_use_synthetic_backend() {
        let mut opener = SystemOpener::new();
        let device = opener
            .open(
                &DeviceId::Path("stub://ok".to_string()),
                &StreamSettings::default(),
                Duration::from_millis(10),
            )
            .unwrap();
        assert!(matches!(device, SystemDevice::Synthetic(_)));
        assert_eq!(device.resolution(), Some(Resolution::VGA));
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn test_index_without_native_backend() {
        let mut opener = SystemOpener::new();
        let result = opener.open(
            &DeviceId::Index(0),
            &StreamSettings::default(),
            Duration::from_millis(10),
        );
        assert!(matches!(result, Err(CameraError::BackendUnavailable(_))));
    }
}
