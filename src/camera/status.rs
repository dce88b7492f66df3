//! Lifecycle states and per-read status values reported by a session.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a [`DeviceSession`](super::DeviceSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No handle; initial state and the state after `release()`
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Handle open and verified
    Connected,
    /// Consecutive read failures crossed `max_failed_frames`
    LinkLost,
    /// Bounded attempt budget exhausted; only `release()` leaves this state
    Failed,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::LinkLost => "link_lost",
            LinkState::Failed => "failed",
        }
    }

    pub fn is_connected(self) -> bool {
        self == LinkState::Connected
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single `read_frame` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    /// A frame was returned
    Success,
    /// No frame this time; failure count still below threshold
    TransientReadFailure,
    /// This call crossed the failure threshold and dropped the handle
    LinkLost,
    /// No handle, and reconnecting was skipped (rate limit) or failed
    Disconnected,
    /// Unexpected device-layer fault
    Error,
}

impl ReadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadStatus::Success => "success",
            ReadStatus::TransientReadFailure => "frame_failed",
            ReadStatus::LinkLost => "connection_lost",
            ReadStatus::Disconnected => "disconnected",
            ReadStatus::Error => "error",
        }
    }
}

impl fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a session for status banners and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Device the session is bound to
    pub device: String,
    pub state: LinkState,
    /// Successful connections after the first one
    pub reconnections: u64,
    /// Connect attempts of any outcome, including `start()`
    pub connect_attempts: u64,
    pub consecutive_failures: u32,
}
