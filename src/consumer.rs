//! Downstream frame consumers.
//!
//! Inference lives outside this crate. Detectors and face matchers are plugged
//! in through these traits and treated as opaque: whatever they return is
//! logged and counted, and their failures never reach the session.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::camera::Frame;

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One object found by a [`Detector`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2}", self.class_name, self.confidence)
    }
}

/// Who a face belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(name) => f.write_str(name),
            Identity::Unknown => f.write_str("Unknown"),
        }
    }
}

/// One face found by a [`FaceMatcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub identity: Identity,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Object detector collaborator.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Vec<Detection>;
}

/// Face identification collaborator.
pub trait FaceMatcher {
    fn match_faces(&mut self, frame: &Frame) -> Vec<FaceMatch>;
}

impl<F> Detector for F
where
    F: FnMut(&Frame) -> Vec<Detection>,
{
    fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        self(frame)
    }
}

/// Sliding-window frames-per-second estimate.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window: usize,
    stamps: VecDeque<Instant>,
}

impl FpsCounter {
    pub const DEFAULT_WINDOW: usize = 30;

    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            stamps: VecDeque::with_capacity(window.max(2)),
        }
    }

    /// Record a frame at `now` and return the current estimate.
    pub fn tick(&mut self, now: Instant) -> f64 {
        self.stamps.push_back(now);
        if self.stamps.len() > self.window {
            self.stamps.pop_front();
        }
        self.fps()
    }

    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.stamps.front(), self.stamps.back()) else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if self.stamps.len() < 2 || span == 0.0 {
            return 0.0;
        }
        (self.stamps.len() - 1) as f64 / span
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}
