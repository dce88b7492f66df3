//! Scheduled capture loop.
//!
//! Polls a [`DeviceSession`] on a fixed tick, hands good frames to the
//! registered consumers, and backs off after non-success statuses so a
//! disconnected camera never turns into a busy loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{Clock, DeviceOpener, DeviceSession, Frame, LinkState, ReadStatus};
use crate::consumer::{Detector, FaceMatcher, FpsCounter};

/// Pacing for [`CaptureLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Target interval between reads while frames flow
    pub tick: Duration,
    /// Wait after `Disconnected`/`LinkLost`
    pub disconnected_poll: Duration,
    /// Wait after a device fault
    pub error_pause: Duration,
    /// How often to repeat the "still waiting" message during an outage
    pub status_interval: Duration,
    /// Log FPS and detections every this many frames
    pub report_every: u64,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(33),
            disconnected_poll: Duration::from_millis(100),
            error_pause: Duration::from_secs(1),
            status_interval: Duration::from_secs(5),
            report_every: 30,
            max_frames: None,
        }
    }
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Stop flag was raised
    Stopped,
    /// `max_frames` reached
    FrameLimit,
    /// Session reached its terminal state
    SessionFailed,
}

/// Totals for one run of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub frames: u64,
    pub transient_failures: u64,
    pub errors: u64,
    /// Outages seen by the loop (a run of non-frame statuses after link loss)
    pub disconnections: u64,
    pub total_disconnected: Duration,
    pub reconnections: u64,
    pub detections: u64,
    pub faces: u64,
}

impl LoopSummary {
    pub fn average_outage(&self) -> Duration {
        if self.disconnections == 0 {
            Duration::ZERO
        } else {
            self.total_disconnected / self.disconnections as u32
        }
    }
}

/// Drives a session and its consumers until stopped.
pub struct CaptureLoop<'a> {
    config: LoopConfig,
    stop: Arc<AtomicBool>,
    detectors: Vec<Box<dyn Detector + 'a>>,
    face_matchers: Vec<Box<dyn FaceMatcher + 'a>>,
}

impl<'a> CaptureLoop<'a> {
    pub fn new(config: LoopConfig, stop: Arc<AtomicBool>) -> Self {
        Self {
            config,
            stop,
            detectors: Vec::new(),
            face_matchers: Vec::new(),
        }
    }

    pub fn with_detector(mut self, detector: impl Detector + 'a) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn with_face_matcher(mut self, matcher: impl FaceMatcher + 'a) -> Self {
        self.face_matchers.push(Box::new(matcher));
        self
    }

    /// Run until the stop flag is set, the frame limit is hit, or the
    /// session fails.
    pub fn run<O: DeviceOpener, C: Clock>(
        &mut self,
        session: &mut DeviceSession<O, C>,
    ) -> LoopSummary {
        let mut summary = LoopSummary {
            exit: LoopExit::Stopped,
            frames: 0,
            transient_failures: 0,
            errors: 0,
            disconnections: 0,
            total_disconnected: Duration::ZERO,
            reconnections: 0,
            detections: 0,
            faces: 0,
        };
        let mut fps = FpsCounter::default();
        let mut outage: Option<Instant> = None;
        let mut last_notice = session.clock().now();

        loop {
            if self.stop.load(Ordering::SeqCst) {
                summary.exit = LoopExit::Stopped;
                break;
            }
            if self
                .config
                .max_frames
                .is_some_and(|max| summary.frames >= max)
            {
                summary.exit = LoopExit::FrameLimit;
                break;
            }

            let started = session.clock().now();
            let (frame, status) = session.read_frame();
            let now = session.clock().now();

            let pause = match (status, frame) {
                (ReadStatus::Success, Some(frame)) => {
                    if let Some(since) = outage.take() {
                        let lasted = now.saturating_duration_since(since);
                        summary.total_disconnected += lasted;
                        log::info!(
                            "Camera reconnected after {:.1} seconds",
                            lasted.as_secs_f64()
                        );
                    }
                    summary.frames += 1;
                    let rate = fps.tick(now);
                    self.consume(&frame, rate, &mut summary);
                    self.config
                        .tick
                        .saturating_sub(now.saturating_duration_since(started))
                }
                (ReadStatus::Success, None) | (ReadStatus::TransientReadFailure, _) => {
                    summary.transient_failures += 1;
                    self.config
                        .tick
                        .saturating_sub(now.saturating_duration_since(started))
                }
                (ReadStatus::LinkLost, _) | (ReadStatus::Disconnected, _) => {
                    match outage {
                        None => {
                            outage = Some(now);
                            last_notice = now;
                            summary.disconnections += 1;
                            log::warn!("Camera disconnected - waiting for reconnection...");
                        }
                        Some(since)
                            if now.saturating_duration_since(last_notice)
                                >= self.config.status_interval =>
                        {
                            log::info!(
                                "Still waiting for camera reconnection... ({:.0}s)",
                                now.saturating_duration_since(since).as_secs_f64()
                            );
                            last_notice = now;
                        }
                        Some(_) => {}
                    }
                    self.config.disconnected_poll
                }
                (ReadStatus::Error, _) => {
                    summary.errors += 1;
                    log::error!("Camera error occurred - trying to recover...");
                    self.config.error_pause
                }
            };

            if session.status() == LinkState::Failed {
                log::error!("Camera {} cannot be recovered", session.device_id());
                summary.exit = LoopExit::SessionFailed;
                break;
            }
            if !pause.is_zero() {
                session.clock().sleep(pause);
            }
        }

        if let Some(since) = outage {
            summary.total_disconnected += session.clock().now().saturating_duration_since(since);
        }
        summary.reconnections = session.reconnections();
        summary
    }

    fn consume(&mut self, frame: &Frame, rate: f64, summary: &mut LoopSummary) {
        let report = self.config.report_every > 0 && summary.frames % self.config.report_every == 0;

        let mut labels = Vec::new();
        for detector in &mut self.detectors {
            let found = detector.detect(frame);
            summary.detections += found.len() as u64;
            if report {
                labels.extend(found.iter().map(ToString::to_string));
            }
        }
        let mut faces = Vec::new();
        for matcher in &mut self.face_matchers {
            let found = matcher.match_faces(frame);
            summary.faces += found.len() as u64;
            if report {
                faces.extend(
                    found
                        .iter()
                        .map(|m| format!("{} ({:.2})", m.identity, m.confidence)),
                );
            }
        }

        if report {
            log::info!("FPS: {:.1}", rate);
            if !labels.is_empty() {
                log::info!("Detections: {}", labels.join(", "));
            }
            if !faces.is_empty() {
                log::info!("Faces: {}", faces.join(", "));
            }
        }
    }
}

/// Raise `flag` on Ctrl+C.
pub fn install_ctrlc_handler(flag: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::scripted::{ReadOutcome, Script, ScriptedOpener};
    use crate::camera::{
        AttemptBudget, BudgetScope, DeviceId, ManualClock, ReconnectPolicy, StreamSettings,
    };
    use crate::consumer::{BoundingBox, Detection, FaceMatch, Identity};

    const CAM: DeviceId = DeviceId::Index(0);

    fn session(
        script: Script,
        policy: ReconnectPolicy,
    ) -> (DeviceSession<ScriptedOpener, ManualClock>, ScriptedOpener) {
        let opener = ScriptedOpener::new();
        opener.script(CAM, script);
        let session = DeviceSession::with_clock(
            CAM,
            StreamSettings::default(),
            policy,
            opener.clone(),
            ManualClock::new(),
        );
        (session, opener)
    }

    fn config(max_frames: u64) -> LoopConfig {
        LoopConfig {
            max_frames: Some(max_frames),
            ..LoopConfig::default()
        }
    }

    fn unit_box() -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    struct OneFace;

    impl FaceMatcher for OneFace {
        fn match_faces(&mut self, _frame: &Frame) -> Vec<FaceMatch> {
            vec![FaceMatch {
                identity: Identity::Unknown,
                confidence: 0.4,
                bbox: unit_box(),
            }]
        }
    }

    #[test]
    fn test_loop_stops_at_frame_limit_and_feeds_consumers() {
        let (mut session, _) = session(Script::healthy(), ReconnectPolicy::default());
        let mut calls = 0;
        let summary = {
            let detector = |_: &Frame| {
                calls += 1;
                vec![Detection {
                    class_name: "cup".to_string(),
                    confidence: 0.8,
                    bbox: unit_box(),
                }]
            };
            CaptureLoop::new(config(45), Arc::new(AtomicBool::new(false)))
                .with_detector(detector)
                .with_face_matcher(OneFace)
                .run(&mut session)
        };

        assert_eq!(summary.exit, LoopExit::FrameLimit);
        assert_eq!(summary.frames, 45);
        assert_eq!(summary.detections, 45);
        assert_eq!(summary.faces, 45);
        assert_eq!(summary.disconnections, 0);
        assert_eq!(calls, 45);
    }

    #[test]
    fn test_loop_honours_stop_flag() {
        let (mut session, opener) = session(Script::healthy(), ReconnectPolicy::default());
        let stop = Arc::new(AtomicBool::new(true));
        let summary = CaptureLoop::new(LoopConfig::default(), stop).run(&mut session);

        assert_eq!(summary.exit, LoopExit::Stopped);
        assert_eq!(summary.frames, 0);
        assert_eq!(opener.open_calls(&CAM), 0);
    }

    #[test]
    fn test_loop_accounts_for_outage() {
        let script = Script::healthy()
            .read(ReadOutcome::Frame)
            .reads(3, ReadOutcome::Frame)
            .reads(5, ReadOutcome::NoFrame);
        let policy = ReconnectPolicy {
            reconnect_delay: Duration::from_secs(1),
            ..ReconnectPolicy::default()
        };
        let (mut session, _) = session(script, policy);
        session.start().unwrap();

        let summary = CaptureLoop::new(config(10), Arc::new(AtomicBool::new(false)))
            .run(&mut session);

        assert_eq!(summary.frames, 10);
        assert_eq!(summary.transient_failures, 4);
        assert_eq!(summary.disconnections, 1);
        assert_eq!(summary.reconnections, 1);
        // Lost at 231ms (7 ticks after start), reopened on the first 100ms
        // poll at least 1s after the start() attempt
        assert_eq!(summary.total_disconnected, Duration::from_millis(800));
        assert_eq!(summary.average_outage(), summary.total_disconnected);
    }

    #[test]
    fn test_loop_pauses_after_error() {
        let script = Script::healthy()
            .read(ReadOutcome::Frame)
            .read(ReadOutcome::Fault);
        let policy = ReconnectPolicy {
            reconnect_delay: Duration::from_millis(500),
            ..ReconnectPolicy::default()
        };
        let (mut session, _) = session(script, policy);
        session.start().unwrap();

        let summary = CaptureLoop::new(config(3), Arc::new(AtomicBool::new(false)))
            .run(&mut session);

        assert_eq!(summary.errors, 1);
        assert_eq!(summary.frames, 3);
        // The 1s pause already covers the reconnect delay
        assert_eq!(summary.disconnections, 0);
        assert!(session.clock().sleeps().contains(&Duration::from_secs(1)));
    }

    #[test]
    fn test_loop_exits_when_session_fails() {
        let script = Script::healthy()
            .read(ReadOutcome::Frame)
            .reads(5, ReadOutcome::NoFrame);
        let policy = ReconnectPolicy {
            attempts: AttemptBudget::Bounded(3),
            budget_scope: BudgetScope::Always,
            reconnect_delay: Duration::from_millis(200),
            ..ReconnectPolicy::default()
        };
        let (mut session, opener) = session(script, policy);
        session.start().unwrap();
        opener.set_openable(&CAM, false);

        let summary = CaptureLoop::new(LoopConfig::default(), Arc::new(AtomicBool::new(false)))
            .run(&mut session);

        assert_eq!(summary.exit, LoopExit::SessionFailed);
        assert_eq!(summary.disconnections, 1);
        assert_eq!(opener.open_calls(&CAM), 4);
    }
}
