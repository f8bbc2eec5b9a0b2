//! Core traits and types for V4L2 streaming capture.

use std::io;
use std::time::Duration;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");

    /// The little-endian code the kernel uses in `pixelformat` fields.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Decode a kernel `pixelformat` value.
    #[must_use]
    pub const fn from_u32(code: u32) -> Self {
        Self(code.to_le_bytes())
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width * 2; // YUYV is 2 bytes per pixel
        let size = stride * height;
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }

    /// Whether the driver accepted the geometry and pixel format of `requested`
    /// with tightly packed rows.
    ///
    /// Frames are decoded as one contiguous run of pixels, so a padded
    /// `bytesperline` does not match. The image size may still exceed
    /// `stride * height`; only the filled bytes are decoded.
    #[must_use]
    pub fn matches(&self, requested: &Self) -> bool {
        self.width == requested.width
            && self.height == requested.height
            && self.fourcc == requested.fourcc
            && self.stride == requested.stride
    }

    /// Byte length of one decoded RGB frame at this geometry.
    #[must_use]
    pub const fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Location of one device buffer, as reported by a buffer query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Slot index in the device's buffer array.
    pub index: u32,
    /// Allocated capacity in bytes.
    pub length: u32,
    /// Offset to pass to `mmap` for this buffer.
    pub offset: u32,
}

/// A filled buffer handed back by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Slot index of the filled buffer.
    pub index: u32,
    /// Bytes actually written by the device; may be below the slot capacity.
    pub bytes_used: u32,
    /// Driver frame sequence number.
    pub sequence: u32,
    /// Driver capture timestamp.
    pub timestamp: Duration,
}

/// Outcome of waiting for a filled buffer.
#[derive(Debug)]
pub enum Readiness {
    /// A filled buffer can be dequeued.
    Ready,
    /// Nothing arrived before the timeout.
    TimedOut,
    /// The wait itself failed.
    Error(io::Error),
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Pool slot the frame was delivered in.
    pub slot: u32,
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A captured frame decoded to interleaved RGB.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    /// Interleaved R, G, B bytes, row-major.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl RgbFrame {
    /// Get RGB values for a pixel at the specified coordinates.
    ///
    /// Returns `None` when the coordinates fall outside the decoded data,
    /// which happens for short (partially filled) frames.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let offset = (y as usize * self.width as usize + x as usize) * 3;
        match self.data.get(offset..offset + 3)? {
            [r, g, b] => Some((*r, *g, *b)),
            _ => None,
        }
    }
}

/// Low-level operations a V4L2 capture node must support.
///
/// Every method maps onto one kernel request. Failures carry the raw OS
/// error so callers can tell, say, `EINVAL` apart from `EBUSY`; turning them
/// into domain errors is left to the buffer pool and the session.
pub trait VideoDevice {
    /// A mapped buffer region readable by the application.
    type Region: AsRef<[u8]>;

    /// Query driver identity and capability flags.
    fn query_caps(&mut self) -> io::Result<DeviceCapabilities>;

    /// Request a capture format. Returns the format as adjusted by the driver.
    fn set_format(&mut self, format: &Format) -> io::Result<Format>;

    /// Read back the currently active capture format.
    fn format(&mut self) -> io::Result<Format>;

    /// Ask for `count` mmap buffers. Returns how many the driver granted.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    /// Look up the length and mapping offset of buffer `index`.
    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo>;

    /// Map a device buffer into process memory.
    fn map_buffer(&mut self, length: u32, offset: u32) -> io::Result<Self::Region>;

    /// Hand buffer `index` to the device for filling.
    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Take one filled buffer back from the device.
    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer>;

    /// Start streaming.
    fn stream_on(&mut self) -> io::Result<()>;

    /// Stop streaming. All queued buffers return to the application.
    fn stream_off(&mut self) -> io::Result<()>;

    /// Block until a filled buffer is available or `timeout` elapses.
    fn wait_readable(&mut self, timeout: Duration) -> Readiness;
}
