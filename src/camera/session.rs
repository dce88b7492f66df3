//! Reconnecting device session.
//!
//! A [`DeviceSession`] owns one logical camera connection. It opens and
//! verifies the device, counts consecutive empty reads, drops the handle when
//! the count reaches the policy threshold, and reopens it later. Reopening is
//! synchronous and rate limited to one attempt per `reconnect_delay`.
//!
//! ```text
//! Disconnected ──start/read──▶ Connecting ──ok──▶ Connected ──N misses──▶ LinkLost
//!      ▲                          │ fail                                      │
//!      └──────────────────────────┘◀──────────── read (rate limited) ─────────┘
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::clock::{Clock, SystemClock};
use super::device::{CameraDevice, DeviceOpener};
use super::policy::{BudgetScope, ReconnectPolicy};
use super::status::{LinkState, ReadStatus, SessionStats};
use super::types::{CameraError, DeviceId, Frame, Resolution, StreamSettings};

/// Errors returned by [`DeviceSession::start`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bounded attempt budget used up without a verified connection
    #[error("Failed to connect to camera {device} after {attempts} attempts")]
    ConnectionFailed {
        device: DeviceId,
        attempts: u32,
        #[source]
        source: CameraError,
    },
    /// The session is in the terminal `Failed` state
    #[error("Camera {0} session has failed; release it before starting again")]
    Exhausted(DeviceId),
}

type TransitionHook = Box<dyn FnMut(LinkState, LinkState) + Send>;

/// Single-owner state machine around one capture device.
pub struct DeviceSession<O: DeviceOpener, C: Clock = SystemClock> {
    device_id: DeviceId,
    settings: StreamSettings,
    policy: ReconnectPolicy,
    opener: O,
    clock: C,
    device: Option<O::Device>,
    state: LinkState,
    /// Consecutive reads that returned no frame
    failed_frames: u32,
    last_attempt: Option<Instant>,
    /// Consecutive failed reconnects; only metered with `BudgetScope::Always`
    failed_reconnects: u32,
    connect_attempts: u64,
    connections: u64,
    on_transition: Option<TransitionHook>,
}

impl<O: DeviceOpener, C: Clock> fmt::Debug for DeviceSession<O, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device_id", &self.device_id)
            .field("state", &self.state)
            .field("failed_frames", &self.failed_frames)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl<O: DeviceOpener> DeviceSession<O, SystemClock> {
    /// Create a disconnected session. Nothing is opened until `start()` or
    /// the first `read_frame()`.
    pub fn new(
        device_id: DeviceId,
        settings: StreamSettings,
        policy: ReconnectPolicy,
        opener: O,
    ) -> Self {
        Self::with_clock(device_id, settings, policy, opener, SystemClock)
    }
}

impl<O: DeviceOpener, C: Clock> DeviceSession<O, C> {
    pub fn with_clock(
        device_id: DeviceId,
        settings: StreamSettings,
        policy: ReconnectPolicy,
        opener: O,
        clock: C,
    ) -> Self {
        Self {
            device_id,
            settings,
            policy,
            opener,
            clock,
            device: None,
            state: LinkState::Disconnected,
            failed_frames: 0,
            last_attempt: None,
            failed_reconnects: 0,
            connect_attempts: 0,
            connections: 0,
            on_transition: None,
        }
    }

    /// Call `hook(from, to)` on every lifecycle transition.
    pub fn on_transition<F>(&mut self, hook: F)
    where
        F: FnMut(LinkState, LinkState) + Send + 'static,
    {
        self.on_transition = Some(Box::new(hook));
    }

    /// Connect, retrying per policy until a frame has been verified.
    ///
    /// Blocks between attempts. With a bounded budget this fails after
    /// exactly that many attempts and leaves the session `Failed`.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.state {
            LinkState::Failed => return Err(SessionError::Exhausted(self.device_id.clone())),
            LinkState::Connected if self.device.is_some() => return Ok(()),
            _ => {}
        }

        let mut failed = 0u32;
        loop {
            let err = match self.connect() {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            failed += 1;

            if self.policy.attempts.is_exhausted(failed) {
                log::error!(
                    "Failed to connect to camera {} after {} attempts: {}",
                    self.device_id,
                    failed,
                    err
                );
                self.transition(LinkState::Failed);
                return Err(SessionError::ConnectionFailed {
                    device: self.device_id.clone(),
                    attempts: failed,
                    source: err,
                });
            }

            let delay = self.policy.retry_delay(failed - 1);
            log::warn!(
                "Camera {} connection failed (attempt {}): {}; retrying in {:.1}s",
                self.device_id,
                failed,
                err,
                delay.as_secs_f64()
            );
            self.clock.sleep(delay);
        }
    }

    /// Read one frame and classify the outcome.
    ///
    /// Never sleeps. When no handle is open this makes at most one connect
    /// attempt, and only if `reconnect_delay` has passed since the last one.
    pub fn read_frame(&mut self) -> (Option<Frame>, ReadStatus) {
        if self.state == LinkState::Failed {
            return (None, ReadStatus::Disconnected);
        }
        if (self.device.is_none() || self.state != LinkState::Connected)
            && !self.reconnect_if_due()
        {
            return (None, ReadStatus::Disconnected);
        }
        let Some(device) = self.device.as_mut() else {
            return (None, ReadStatus::Disconnected);
        };

        match device.read(self.policy.frame_timeout) {
            Ok(Some(frame)) => {
                self.failed_frames = 0;
                (Some(frame), ReadStatus::Success)
            }
            Ok(None) => {
                self.failed_frames += 1;
                log::warn!(
                    "Frame read failed ({}/{})",
                    self.failed_frames,
                    self.policy.max_failed_frames
                );
                if self.failed_frames >= self.policy.max_failed_frames {
                    log::warn!(
                        "Too many failed frames, marking camera {} as lost",
                        self.device_id
                    );
                    self.drop_handle();
                    self.transition(LinkState::LinkLost);
                    (None, ReadStatus::LinkLost)
                } else {
                    (None, ReadStatus::TransientReadFailure)
                }
            }
            Err(e) => {
                log::error!("Camera {} read error: {}", self.device_id, e);
                self.drop_handle();
                self.transition(LinkState::Disconnected);
                (None, ReadStatus::Error)
            }
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> LinkState {
        self.state
    }

    /// True while a verified handle is open.
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected && self.device.is_some()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            device: self.device_id.to_string(),
            state: self.state,
            reconnections: self.reconnections(),
            connect_attempts: self.connect_attempts,
            consecutive_failures: self.failed_frames,
        }
    }

    /// Successful connections after the first.
    pub fn reconnections(&self) -> u64 {
        self.connections.saturating_sub(1)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failed_frames
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Time source shared with callers that pace their polling.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Resolution negotiated by the open device, if any.
    pub fn actual_resolution(&self) -> Option<Resolution> {
        self.device.as_ref().and_then(|d| d.resolution())
    }

    /// Free the device and reset to the initial state. Safe to call repeatedly.
    pub fn release(&mut self) {
        let had_handle = self.device.is_some();
        self.drop_handle();
        self.failed_frames = 0;
        self.last_attempt = None;
        self.failed_reconnects = 0;
        self.connect_attempts = 0;
        self.connections = 0;
        self.transition(LinkState::Disconnected);
        if had_handle {
            log::info!("Camera {} released", self.device_id);
        }
    }

    fn reconnect_if_due(&mut self) -> bool {
        if let Some(last) = self.last_attempt {
            let since = self.clock.now().saturating_duration_since(last);
            if since < self.policy.reconnect_delay {
                return false;
            }
        }

        log::info!(
            "Camera {} disconnected, attempting to reconnect...",
            self.device_id
        );
        match self.connect() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Reconnect to camera {} failed: {}", self.device_id, e);
                if self.policy.budget_scope == BudgetScope::Always {
                    self.failed_reconnects += 1;
                    if self.policy.attempts.is_exhausted(self.failed_reconnects) {
                        log::error!(
                            "Giving up on camera {} after {} failed reconnects",
                            self.device_id,
                            self.failed_reconnects
                        );
                        self.transition(LinkState::Failed);
                    }
                }
                false
            }
        }
    }

    /// One connect attempt: release any old handle, open, verify one frame.
    fn connect(&mut self) -> Result<(), CameraError> {
        self.drop_handle();
        self.transition(LinkState::Connecting);

        let began = self.clock.now();
        self.last_attempt = Some(began);
        self.connect_attempts += 1;
        log::info!("Connecting to camera {}...", self.device_id);

        match self.open_verified(began) {
            Ok(device) => {
                let resolution = device.resolution().unwrap_or(self.settings.resolution);
                self.device = Some(device);
                self.failed_frames = 0;
                self.failed_reconnects = 0;
                self.connections += 1;
                self.transition(LinkState::Connected);
                log::info!("Camera {} connected: {}", self.device_id, resolution);
                Ok(())
            }
            Err(e) => {
                self.transition(LinkState::Disconnected);
                Err(e)
            }
        }
    }

    fn open_verified(&mut self, began: Instant) -> Result<O::Device, CameraError> {
        let timeout = self.policy.connection_timeout;
        let mut device = self.opener.open(&self.device_id, &self.settings, timeout)?;

        let remaining = timeout.saturating_sub(self.clock.now().saturating_duration_since(began));
        if remaining == Duration::ZERO {
            device.release();
            return Err(CameraError::Timeout(timeout));
        }

        match device.read(remaining) {
            Ok(Some(_)) => Ok(device),
            Ok(None) => {
                device.release();
                Err(CameraError::Timeout(timeout))
            }
            Err(e) => {
                device.release();
                Err(e)
            }
        }
    }

    fn drop_handle(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
        }
    }

    fn transition(&mut self, to: LinkState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        log::debug!("Camera {}: {} -> {}", self.device_id, from, to);
        if let Some(hook) = self.on_transition.as_mut() {
            hook(from, to);
        }
    }
}

impl<O: DeviceOpener, C: Clock> Drop for DeviceSession<O, C> {
    fn drop(&mut self) {
        self.drop_handle();
    }
}
