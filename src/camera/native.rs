//! Real cameras through nokhwa.
//!
//! The nokhwa `Camera` lives on a worker thread for its whole life, which
//! avoids its thread-safety restrictions and lets every blocking call (open,
//! frame grab) be bounded with `recv_timeout`. Releasing waits at most one
//! read timeout for the worker; one stuck in the driver is detached, and the
//! same camera is not reopened until that thread has exited.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::device::{CameraDevice, DeviceOpener};
use super::types::{
    CameraError, CameraInfo, DeviceId, Frame, FrameFormat, Resolution, StreamSettings,
};
use super::worker::{Worker, WorkerRegistry};

/// List cameras known to the OS.
pub fn query_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            id: match d.index().as_index() {
                Ok(index) => DeviceId::Index(index),
                Err(_) => DeviceId::Path(d.index().to_string()),
            },
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

/// Commands sent to the worker thread.
enum WorkerCommand {
    Grab,
    Stop,
}

type GrabResult = Result<Option<Frame>, CameraError>;

/// Opens USB/system cameras.
///
/// Clones share the set of capture threads that were detached while stuck
/// in the driver; a camera is not reopened until its old thread has exited.
#[derive(Debug, Clone, Default)]
pub struct NativeOpener {
    workers: WorkerRegistry,
}

impl DeviceOpener for NativeOpener {
    type Device = NativeDevice;

    fn open(
        &mut self,
        id: &DeviceId,
        settings: &StreamSettings,
        timeout: Duration,
    ) -> Result<NativeDevice, CameraError> {
        let began = Instant::now();
        let key = id.to_string();
        if !self.workers.wait_clear(&key, timeout) {
            return Err(CameraError::OpenFailed(format!(
                "previous capture thread for camera {} has not exited",
                id
            )));
        }
        let remaining = timeout.saturating_sub(began.elapsed());

        let index = match id {
            DeviceId::Index(i) => CameraIndex::Index(*i),
            DeviceId::Path(p) => CameraIndex::String(p.clone()),
        };

        let (command_tx, command_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::channel();
        let (info_tx, info_rx) = mpsc::channel::<Result<Resolution, CameraError>>();
        let stop_signal = Arc::new(AtomicBool::new(false));

        let stop = Arc::clone(&stop_signal);
        let settings = settings.clone();
        let worker = Worker::spawn(move || {
            run_worker(index, settings, stop, command_rx, frame_tx, info_tx);
        });

        match info_rx.recv_timeout(remaining) {
            Ok(Ok(resolution)) => Ok(NativeDevice {
                key,
                worker: Some(worker),
                workers: self.workers.clone(),
                command_tx: Some(command_tx),
                frame_rx,
                stop_signal,
                resolution,
                release_wait: timeout,
            }),
            Ok(Err(e)) => {
                self.workers.retire(&key, worker, timeout);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // Worker drops the camera itself once the open returns
                stop_signal.store(true, Ordering::SeqCst);
                self.workers.retire(&key, worker, Duration::ZERO);
                Err(CameraError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.workers.retire(&key, worker, timeout);
                Err(CameraError::StreamFailed(
                    "Capture thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }
}

/// Open camera owned by a worker thread.
pub struct NativeDevice {
    key: String,
    worker: Option<Worker>,
    workers: WorkerRegistry,
    command_tx: Option<Sender<WorkerCommand>>,
    frame_rx: Receiver<GrabResult>,
    stop_signal: Arc<AtomicBool>,
    resolution: Resolution,
    // How long release() waits for the worker; tracks the last read timeout
    release_wait: Duration,
}

impl std::fmt::Debug for NativeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDevice")
            .field("camera", &self.key)
            .field("resolution", &self.resolution)
            .field("open", &self.command_tx.is_some())
            .finish_non_exhaustive()
    }
}

impl CameraDevice for NativeDevice {
    fn read(&mut self, timeout: Duration) -> Result<Option<Frame>, CameraError> {
        let Some(tx) = self.command_tx.as_ref() else {
            return Err(CameraError::ReadFailed("device released".to_string()));
        };
        self.release_wait = timeout;

        // Discard frames that arrived after an earlier grab timed out
        while self.frame_rx.try_recv().is_ok() {}

        if tx.send(WorkerCommand::Grab).is_err() {
            return Err(CameraError::ReadFailed("capture thread exited".to_string()));
        }
        match self.frame_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CameraError::ReadFailed("capture thread exited".to_string()))
            }
        }
    }

    fn resolution(&self) -> Option<Resolution> {
        Some(self.resolution)
    }

    /// Stop the worker, waiting at most one read timeout for it. A worker
    /// stuck in a grab is detached and keeps the camera marked busy.
    fn release(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(WorkerCommand::Stop);
        }
        if let Some(worker) = self.worker.take() {
            self.workers.retire(&self.key, worker, self.release_wait);
        }
    }
}

impl Drop for NativeDevice {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_worker(
    index: CameraIndex,
    settings: StreamSettings,
    stop: Arc<AtomicBool>,
    rx: Receiver<WorkerCommand>,
    frame_tx: Sender<GrabResult>,
    info_tx: Sender<Result<Resolution, CameraError>>,
) {
    let mut camera = match open_camera_with_fallback(&index, &settings) {
        Ok(cam) => cam,
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = info_tx.send(Err(CameraError::StreamFailed(e.to_string())));
        return;
    }

    let res = camera.resolution();
    let actual = Resolution {
        width: res.width(),
        height: res.height(),
    };
    if info_tx.send(Ok(actual)).is_err() || stop.load(Ordering::SeqCst) {
        // Opener gave up waiting
        let _ = camera.stop_stream();
        return;
    }

    while let Ok(WorkerCommand::Grab) = rx.recv() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let result = match camera.frame() {
            Ok(buffer) => Ok(convert_to_rgb(&buffer)),
            // An unplugged camera surfaces as a failed grab: no data, not a fault
            Err(e) => {
                log::debug!("frame grab failed: {}", e);
                Ok(None)
            }
        };
        if frame_tx.send(result).is_err() {
            break;
        }
    }

    let _ = camera.stop_stream();
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(
    index: &CameraIndex,
    settings: &StreamSettings,
) -> Result<Camera, CameraError> {
    let resolution =
        nokhwa::utils::Resolution::new(settings.resolution.width, settings.resolution.height);
    // MJPEG first (what most USB webcams stream at full rate), then YUYV,
    // then whatever the camera offers
    let format_attempts = [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            resolution,
            NokhwaFrameFormat::MJPEG,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            resolution,
            NokhwaFrameFormat::YUYV,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
    ];

    let mut last_error = String::from("no format accepted");
    for requested in format_attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => last_error = e.to_string(),
        }
    }

    let msg = last_error.to_lowercase();
    if msg.contains("permission") || msg.contains("denied") || msg.contains("authorization") {
        Err(CameraError::PermissionDenied)
    } else {
        Err(CameraError::OpenFailed(last_error))
    }
}

/// Decode a nokhwa buffer (MJPEG, YUYV, NV12, ...) into an RGB frame.
///
/// Returns `None` if the conversion fails (unsupported format or corrupt data).
fn convert_to_rgb(buffer: &nokhwa::Buffer) -> Option<Frame> {
    let decoded = buffer.decode_image::<RgbFormat>().ok()?;
    let resolution = buffer.resolution();

    Some(Frame {
        data: decoded.into_raw(),
        width: resolution.width(),
        height: resolution.height(),
        format: FrameFormat::Rgb,
        timestamp: Instant::now(),
    })
}
