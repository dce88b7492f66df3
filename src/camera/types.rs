//! Camera types and data structures.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use thiserror::Error;

/// Identifies a capture device: a numeric index or a path/URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceId {
    /// System device index (`0` is usually the first USB camera)
    Index(u32),
    /// Device node or URL, e.g. `/dev/video2` or `stub://ok`
    Path(String),
}

impl DeviceId {
    /// True for ids served by the synthetic backend.
    pub fn is_stub(&self) -> bool {
        matches!(self, DeviceId::Path(p) if p.starts_with("stub://"))
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        DeviceId::Index(0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Index(i) => write!(f, "{}", i),
            DeviceId::Path(p) => write!(f, "{}", p),
        }
    }
}

impl FromStr for DeviceId {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CameraError::InvalidDevice(s.to_string()));
        }
        Ok(match s.parse::<u32>() {
            Ok(index) => DeviceId::Index(index),
            Err(_) => DeviceId::Path(s.to_string()),
        })
    }
}

/// Information about an available camera device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Device identifier for selection
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.name, self.description)
    }
}

/// Camera resolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 640x480, what most USB webcams deliver without negotiation
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::VGA
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Rgb => 3,
        }
    }
}

/// A captured camera frame.
///
/// Handed to the caller by value on every successful read; the session keeps
/// no reference to it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data, row-major
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Build a frame filled with a single RGB colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }

    /// Get the number of bytes per pixel (3 for RGB).
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.channels()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }
}

/// Requested stream parameters, fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Capture resolution
    pub resolution: Resolution,
    /// Target FPS (actual may vary)
    pub fps: u32,
    /// Driver-side frame queue depth; 1 keeps latency minimal
    pub buffer_size: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            fps: 30,
            buffer_size: 1,
        }
    }
}

/// Errors raised by the device layer.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Failed to query camera devices
    #[error("Failed to query cameras: {0}")]
    QueryFailed(String),
    /// Failed to open camera
    #[error("Failed to open camera: {0}")]
    OpenFailed(String),
    /// Camera permission denied
    #[error("Camera permission denied. On Linux, add your user to the 'video' group")]
    PermissionDenied,
    /// Camera device not found at specified id
    #[error("Camera device {0} not found. Run 'list-cameras' to see available devices")]
    DeviceNotFound(DeviceId),
    /// Device identifier could not be parsed
    #[error("Invalid camera device '{0}'")]
    InvalidDevice(String),
    /// Failed to start video stream
    #[error("Failed to start camera stream: {0}")]
    StreamFailed(String),
    /// Opened but did not deliver a verifying frame
    #[error("Camera did not deliver a frame within {0:?}")]
    Timeout(std::time::Duration),
    /// Unexpected fault while reading from an open device
    #[error("Camera read failed: {0}")]
    ReadFailed(String),
    /// Built without a backend able to open this device
    #[error("No camera backend for device {0}; rebuild with --features native")]
    BackendUnavailable(DeviceId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_parse_index() {
        assert_eq!("0".parse::<DeviceId>().unwrap(), DeviceId::Index(0));
        assert_eq!(" 3 ".parse::<DeviceId>().unwrap(), DeviceId::Index(3));
    }

    #[test]
    fn test_device_id_parse_path() {
        let id: DeviceId = "/dev/video2".parse().unwrap();
        assert_eq!(id, DeviceId::Path("/dev/video2".to_string()));
        assert!(!id.is_stub());
        assert!("stub://ok".parse::<DeviceId>().unwrap().is_stub());
    }

    #[test]
    fn test_device_id_parse_empty() {
        assert!(matches!(
            "  ".parse::<DeviceId>(),
            Err(CameraError::InvalidDevice(_))
        ));
    }

    #[test]
    fn test_camera_info_display() {
        let info = CameraInfo {
            id: DeviceId::Index(0),
            name: "Test Camera".to_string(),
            description: "USB".to_string(),
        };
        assert_eq!(format!("{}", info), "[0] Test Camera (USB)");
    }

    #[test]
    fn test_stream_settings_default() {
        let settings = StreamSettings::default();
        assert_eq!(settings.resolution, Resolution::VGA);
        assert_eq!(settings.fps, 30);
        assert_eq!(settings.buffer_size, 1);
    }

    #[test]
    fn test_solid_frame_layout() {
        let frame = Frame::solid(2, 3, [1, 2, 3]);
        assert_eq!(frame.data.len(), 2 * 3 * 3);
        assert_eq!(&frame.data[3..6], &[1, 2, 3]);
        assert_eq!(frame.bytes_per_pixel(), 3);
        assert_eq!(frame.resolution().to_string(), "2x3");
    }

    #[test]
    fn test_camera_error_display() {
        assert_eq!(
            format!("{}", CameraError::OpenFailed("busy".to_string())),
            "Failed to open camera: busy"
        );
        assert!(format!("{}", CameraError::DeviceNotFound(DeviceId::Index(5))).contains('5'));
        assert!(
            format!("{}", CameraError::BackendUnavailable(DeviceId::Index(0)))
                .contains("--features native")
        );
    }
}
