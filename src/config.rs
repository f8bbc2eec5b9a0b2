//! Capture session configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::traits::{Format, FourCC};

/// Device node used when none is given.
pub const DEFAULT_DEVICE: &str = "/dev/video0";
/// Requested frame width in pixels.
pub const DEFAULT_WIDTH: u32 = 640;
/// Requested frame height in pixels.
pub const DEFAULT_HEIGHT: u32 = 480;
/// Number of mmap buffers requested from the driver.
pub const DEFAULT_BUFFER_COUNT: u32 = 30;
/// How long `grab` waits for a filled buffer.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings a [`CaptureSession`](crate::session::CaptureSession) negotiates
/// with the device at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device node path.
    pub device: PathBuf,
    /// Requested capture format.
    pub format: Format,
    /// Number of buffers to request.
    pub buffer_count: u32,
    /// Per-frame readiness timeout.
    pub frame_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            format: Format::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, FourCC::YUYV),
            buffer_count: DEFAULT_BUFFER_COUNT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }
}

impl CaptureConfig {
    /// Default settings for the given device node.
    #[must_use]
    pub fn for_device<P: Into<PathBuf>>(device: P) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }
}
