//! camwatch library crate.
//!
//! Keeps a live frame stream flowing from a hot-pluggable camera. The core is
//! [`camera::DeviceSession`], a reconnecting state machine that classifies
//! every read; everything else is a thin consumer of it.

pub mod camera;
pub mod capture_loop;
pub mod cli;
pub mod config;
pub mod consumer;
