//! YUYV-Capture: streaming V4L2 frame capture with YUYV to RGB conversion
//!
//! This library drives a V4L2 capture node through the mmap streaming
//! protocol and decodes each delivered YUYV frame into interleaved RGB.
//! Device access sits behind the [`VideoDevice`] trait, so the session and
//! buffer pool run the same way on real hardware and on a mock device.

pub mod config;
pub mod convert;
pub mod device;
pub mod error;
pub mod output;
pub mod pool;
pub mod session;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use config::CaptureConfig;
pub use device::V4L2Device;
pub use error::{CaptureError, Result};
pub use session::{CaptureSession, SessionState};
pub use traits::{
    DeviceCapabilities, Format, FourCC, FrameMetadata, Readiness, RgbFrame, VideoDevice,
};
