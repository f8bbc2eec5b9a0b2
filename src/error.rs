//! Error type for capture operations.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;
use crate::traits::Format;

/// Error type for capture operations.
///
/// Variants carry the failing operation's context (path, slot index,
/// formats) plus the OS error where one exists. Rendering to text is left to
/// the caller.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device node could not be opened.
    #[error("failed to open {}", .path.display())]
    DeviceOpen {
        /// Device path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The capability query was rejected with `EINVAL`.
    #[error("{} is no V4L2 device", .path.display())]
    NotV4l2Device {
        /// Device path.
        path: PathBuf,
    },

    /// The capability query failed for another reason.
    #[error("failed to query capabilities of {}", .path.display())]
    CapabilityQuery {
        /// Device path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The device lacks a capability streaming capture depends on.
    #[error("{} does not support {capability}", .path.display())]
    MissingCapability {
        /// Device path.
        path: PathBuf,
        /// Name of the missing capability.
        capability: &'static str,
    },

    /// The driver rejected the requested pixel format.
    #[error("failed to set pixel format {} {}x{} for {}", .requested.fourcc, .requested.width, .requested.height, .path.display())]
    FormatNegotiation {
        /// Device path.
        path: PathBuf,
        /// Format that was requested.
        requested: Format,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Reading back the active format failed.
    #[error("failed to read back pixel format of {}", .path.display())]
    FormatQuery {
        /// Device path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The driver silently adjusted the requested format.
    #[error(
        "{} accepted {} {}x{} stride {} instead of {} {}x{} stride {}",
        .path.display(),
        .actual.fourcc,
        .actual.width,
        .actual.height,
        .actual.stride,
        .requested.fourcc,
        .requested.width,
        .requested.height,
        .requested.stride
    )]
    FormatMismatch {
        /// Device path.
        path: PathBuf,
        /// Format that was requested.
        requested: Format,
        /// Format the driver reports as active.
        actual: Format,
    },

    /// The buffer request was rejected.
    #[error("failed to request {requested} buffers")]
    BufferRequest {
        /// Number of buffers requested.
        requested: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The driver granted an unusable number of buffers.
    #[error("got {granted} buffers instead of {requested}")]
    BufferCount {
        /// Number of buffers requested.
        requested: u32,
        /// Number of buffers granted.
        granted: u32,
    },

    /// Querying a buffer's location failed.
    #[error("failed to query buffer {index}")]
    BufferQuery {
        /// Slot index.
        index: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Initial queueing of a buffer failed.
    #[error("failed to queue buffer {index}")]
    BufferEnqueue {
        /// Slot index.
        index: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Mapping a buffer into process memory failed.
    #[error("failed to map buffer {index}")]
    Map {
        /// Slot index.
        index: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Buffer pool setup failed during `open`.
    #[error("failed to set up buffers for {}", .path.display())]
    BufferSetup {
        /// Device path.
        path: PathBuf,
        /// The pool error.
        #[source]
        source: Box<CaptureError>,
    },

    /// A slot index was out of range or in the wrong ownership state.
    #[error("buffer slot {index} is not available for this operation")]
    InvalidSlot {
        /// Slot index.
        index: u32,
    },

    /// The stream-on request was rejected.
    #[error("failed to start capturing from {}", .path.display())]
    StreamStart {
        /// Device path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The stream-off request was rejected.
    #[error("failed to stop capturing")]
    StreamStop {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// `open` was called on a session that is not fresh.
    #[error("session cannot be opened from state {0:?}")]
    InvalidState(SessionState),

    /// `grab` was called on a session that is not streaming.
    #[error("capture session is not open (state {0:?})")]
    SessionNotOpen(SessionState),

    /// No frame arrived within the timeout.
    #[error("no frame within {0:?}")]
    FrameTimeout(Duration),

    /// Waiting for a frame failed.
    #[error("waiting frame failed")]
    FrameWait(#[source] io::Error),

    /// Dequeueing a filled buffer failed.
    #[error("failed to retrieve frame")]
    FrameDequeue(#[source] io::Error),

    /// Returning a buffer to the device failed; the session is unusable.
    #[error("failed to requeue buffer {index}")]
    FrameRequeue {
        /// Slot index.
        index: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Writing an output image failed.
    #[error("failed to write {}", .path.display())]
    Output {
        /// Output file path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
