//! Streaming capture session.
//!
//! A session drives one device through its whole streaming lifetime:
//!
//! ```text
//! Unopened -> Configured -> Streaming <-> AwaitingFrame
//!                 |             |
//!                 v             v
//!              Failed        Closed
//! ```
//!
//! Teardown (stream off, unmap, buffer release) runs on every exit path:
//! a failed `open`, an explicit `close`, or drop.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::convert;
use crate::device::V4L2Device;
use crate::error::{CaptureError, Result};
use crate::pool::BufferPool;
use crate::traits::{DeviceCapabilities, Format, FrameMetadata, Readiness, RgbFrame, VideoDevice};

/// Lifecycle state of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no device I/O yet.
    Unopened,
    /// Capabilities checked and format negotiated.
    Configured,
    /// Buffers queued and streaming; ready for `grab`.
    Streaming,
    /// A `grab` is waiting for or processing a frame.
    AwaitingFrame,
    /// `open` or a buffer requeue failed; the session cannot be used.
    Failed,
    /// Torn down by `close`.
    Closed,
}

/// Streaming capture from one V4L2 device into RGB frames.
pub struct CaptureSession<D: VideoDevice> {
    device: D,
    config: CaptureConfig,
    state: SessionState,
    capabilities: Option<DeviceCapabilities>,
    format: Option<Format>,
    pool: Option<BufferPool<D::Region>>,
    streaming: bool,
}

impl CaptureSession<V4L2Device> {
    /// Open the configured device node and start streaming.
    pub fn open_device(config: CaptureConfig) -> Result<Self> {
        let device = V4L2Device::open(&config.device)?;
        let mut session = Self::new(device, config);
        session.open()?;
        Ok(session)
    }
}

impl<D: VideoDevice> CaptureSession<D> {
    /// Wrap an already opened device. No I/O happens until [`open`](Self::open).
    pub const fn new(device: D, config: CaptureConfig) -> Self {
        Self {
            device,
            config,
            state: SessionState::Unopened,
            capabilities: None,
            format: None,
            pool: None,
            streaming: false,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Session configuration.
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capabilities reported at open time.
    pub const fn capabilities(&self) -> Option<&DeviceCapabilities> {
        self.capabilities.as_ref()
    }

    /// Format the driver accepted.
    pub const fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Number of buffers in the pool, zero before `open`.
    pub fn buffer_count(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::len)
    }

    /// The underlying device.
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the underlying device.
    ///
    /// Issuing queue or stream requests behind the session's back breaks its
    /// slot bookkeeping.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Configure the device, set up the buffer pool and start streaming.
    ///
    /// On failure everything built so far is torn down and the session is
    /// left [`Failed`](SessionState::Failed).
    pub fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Unopened {
            return Err(CaptureError::InvalidState(self.state));
        }

        let result = self.configure().and_then(|()| self.start());
        match result {
            Ok(()) => {
                self.state = SessionState::Streaming;
                info!(
                    path = %self.config.device.display(),
                    buffers = self.buffer_count(),
                    "streaming started"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(teardown) = self.teardown() {
                    warn!(error = %teardown, "teardown after failed open");
                }
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    fn configure(&mut self) -> Result<()> {
        let path = self.path();

        let caps = self.device.query_caps().map_err(|source| {
            if source.raw_os_error() == Some(libc::EINVAL) {
                CaptureError::NotV4l2Device { path: path.clone() }
            } else {
                CaptureError::CapabilityQuery {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        info!(driver = %caps.driver, card = %caps.card, bus = %caps.bus_info, "device capabilities");

        if !caps.can_capture {
            return Err(CaptureError::MissingCapability {
                path,
                capability: "video capture",
            });
        }
        if !caps.can_stream {
            return Err(CaptureError::MissingCapability {
                path,
                capability: "streaming I/O",
            });
        }
        self.capabilities = Some(caps);

        let requested = self.config.format.clone();
        let negotiated = self.device.set_format(&requested).map_err(|source| {
            CaptureError::FormatNegotiation {
                path: path.clone(),
                requested: requested.clone(),
                source,
            }
        })?;
        debug!(?negotiated, "format set");

        // Drivers may adjust the request instead of rejecting it; read back
        // what is actually active.
        let actual = self
            .device
            .format()
            .map_err(|source| CaptureError::FormatQuery {
                path: path.clone(),
                source,
            })?;

        if !actual.matches(&requested) {
            return Err(CaptureError::FormatMismatch {
                path,
                requested,
                actual,
            });
        }

        info!(
            width = actual.width,
            height = actual.height,
            fourcc = %actual.fourcc,
            stride = actual.stride,
            "format negotiated"
        );
        self.format = Some(actual);
        self.state = SessionState::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let pool = BufferPool::allocate(&mut self.device, self.config.buffer_count).map_err(
            |source| CaptureError::BufferSetup {
                path: self.path(),
                source: Box::new(source),
            },
        )?;
        self.pool = Some(pool);

        self.device
            .stream_on()
            .map_err(|source| CaptureError::StreamStart {
                path: self.path(),
                source,
            })?;
        self.streaming = true;
        Ok(())
    }

    /// Capture one frame and decode it to RGB.
    pub fn grab(&mut self) -> Result<RgbFrame> {
        let mut data = Vec::with_capacity(self.config.format.rgb_len());
        let metadata = self.grab_into(&mut data)?;

        Ok(RgbFrame {
            data,
            width: self.config.format.width,
            height: self.config.format.height,
            metadata,
        })
    }

    /// Capture one frame, decoding it into `rgb`.
    ///
    /// `rgb` is resized to the decoded length, which follows the number of
    /// bytes the driver filled.
    pub fn grab_into(&mut self, rgb: &mut Vec<u8>) -> Result<FrameMetadata> {
        self.grab_with(|yuyv| convert::decode_rgb_into(yuyv, rgb))
            .map(|((), metadata)| metadata)
    }

    /// Capture one frame and hand its raw YUYV bytes to `process`.
    ///
    /// The slice covers the filled part of the buffer and is only valid
    /// while the slot is dequeued; the buffer is requeued once `process`
    /// returns.
    pub fn grab_with<F, T>(&mut self, process: F) -> Result<(T, FrameMetadata)>
    where
        F: FnOnce(&[u8]) -> T,
    {
        if self.state != SessionState::Streaming {
            return Err(CaptureError::SessionNotOpen(self.state));
        }

        self.state = SessionState::AwaitingFrame;
        let result = self.cycle(process);
        if self.state == SessionState::AwaitingFrame {
            self.state = SessionState::Streaming;
        }
        result
    }

    /// Wait, dequeue, process, requeue.
    fn cycle<F, T>(&mut self, process: F) -> Result<(T, FrameMetadata)>
    where
        F: FnOnce(&[u8]) -> T,
    {
        let Self {
            device,
            config,
            state,
            pool,
            ..
        } = self;
        let pool = pool.as_mut().ok_or(CaptureError::SessionNotOpen(*state))?;

        match device.wait_readable(config.frame_timeout) {
            Readiness::Ready => {}
            Readiness::TimedOut => return Err(CaptureError::FrameTimeout(config.frame_timeout)),
            Readiness::Error(source) => return Err(CaptureError::FrameWait(source)),
        }

        let buffer = device.dequeue_buffer().map_err(CaptureError::FrameDequeue)?;

        let output = match pool.dequeue(buffer.index) {
            Ok(region) => {
                let filled = usize::try_from(buffer.bytes_used)
                    .unwrap_or(usize::MAX)
                    .min(region.len());
                process(region.get(..filled).unwrap_or_default())
            }
            Err(err) => {
                // The driver handed back a slot we do not think it owns
                *state = SessionState::Failed;
                return Err(err);
            }
        };

        if let Err(source) = device.queue_buffer(buffer.index) {
            *state = SessionState::Failed;
            return Err(CaptureError::FrameRequeue {
                index: buffer.index,
                source,
            });
        }
        pool.mark_queued(buffer.index)?;

        debug!(
            slot = buffer.index,
            sequence = buffer.sequence,
            bytes_used = buffer.bytes_used,
            "frame captured"
        );

        Ok((
            output,
            FrameMetadata {
                slot: buffer.index,
                sequence: buffer.sequence,
                timestamp: buffer.timestamp,
                bytes_used: buffer.bytes_used,
            },
        ))
    }

    /// Stop streaming and release all buffers. Calling this again is a no-op.
    ///
    /// The device descriptor itself is closed when the session is dropped.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let result = self.teardown();
        self.state = SessionState::Closed;
        info!(path = %self.config.device.display(), "session closed");
        result
    }

    /// Stream off and release the pool. Keeps going after a failure and
    /// reports the first error.
    fn teardown(&mut self) -> Result<()> {
        let mut first_error = None;

        if self.streaming {
            self.streaming = false;
            if let Err(source) = self.device.stream_off() {
                warn!(error = %source, "stream off failed");
                first_error.get_or_insert(CaptureError::StreamStop { source });
            }
        }

        if let Some(pool) = self.pool.take() {
            if let Err(err) = pool.release(&mut self.device) {
                warn!(error = %err, "buffer release failed");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn path(&self) -> PathBuf {
        self.config.device.clone()
    }
}

impl<D: VideoDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            warn!(error = %err, "teardown on drop failed");
        }
    }
}
