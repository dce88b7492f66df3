//! Camera access with automatic reconnection.
//!
//! - Session state machine via [`DeviceSession`]
//! - Device seam via [`CameraDevice`] / [`DeviceOpener`], with the
//!   [`SystemOpener`] backend for real and `stub://` devices
//! - Enumeration via [`list_devices`] and [`probe_devices`]
//! - Policy via [`ReconnectPolicy`]

mod backend;
mod clock;
mod device;
#[cfg(feature = "native")]
mod native;
mod policy;
#[cfg(test)]
pub(crate) mod scripted;
mod session;
mod status;
mod synthetic;
mod types;
#[cfg(any(feature = "native", test))]
mod worker;

pub use backend::{SystemDevice, SystemOpener};
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{list_devices, probe_devices, CameraDevice, DeviceOpener, DEFAULT_PROBE_RANGE};
pub use policy::{
    calculate_backoff, AttemptBudget, Backoff, BudgetScope, PolicyError, ReconnectPolicy,
    DEFAULT_BACKOFF_MAX, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_FRAME_TIMEOUT,
    DEFAULT_MAX_FAILED_FRAMES, DEFAULT_RECONNECT_DELAY,
};
pub use session::{DeviceSession, SessionError};
pub use status::{LinkState, ReadStatus, SessionStats};
pub use synthetic::{StubProfile, SyntheticDevice, SyntheticOpener};
pub use types::{CameraError, CameraInfo, DeviceId, Frame, FrameFormat, Resolution, StreamSettings};

#[cfg(feature = "native")]
pub use native::{NativeDevice, NativeOpener};
