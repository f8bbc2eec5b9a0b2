//! V4L2 device implementation over raw ioctls from the v4l crate.
//!
//! This is the only module that talks to the kernel directly. Each
//! [`VideoDevice`] method fills in the matching `v4l_sys` struct and issues
//! one request through [`V4L2Device::control`].

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::time::Duration;
use std::{io, mem, ptr, slice};

use tracing::{debug, trace, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::memory::Memory;
use v4l::v4l2;
use v4l::v4l2::vidioc;
use v4l::v4l_sys::{
    v4l2_buffer, v4l2_capability, v4l2_format, v4l2_pix_format, v4l2_requestbuffers,
};

use crate::error::{CaptureError, Result};
use crate::traits::{
    BufferInfo, DequeuedBuffer, DeviceCapabilities, Format, FourCC, Readiness, VideoDevice,
};

/// `V4L2_FIELD_NONE`: progressive frames, no interlacing.
const FIELD_NONE: u32 = 1;
/// `V4L2_CAP_DEVICE_CAPS`: `device_caps` is valid and describes this node.
const CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// An open V4L2 capture node.
///
/// The descriptor is closed exactly once, either by [`close`](Self::close)
/// or on drop. Control operations on a closed device fail with `EBADF`.
#[derive(Debug)]
pub struct V4L2Device {
    file: Option<File>,
    path: PathBuf,
}

impl V4L2Device {
    /// Open a device node read/write in non-blocking mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| CaptureError::DeviceOpen {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "opened device");
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open_index(index: u32) -> Result<Self> {
        Self::open(format!("/dev/video{index}"))
    }

    /// Whether the descriptor is still open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Close the descriptor. Calling this again is a no-op.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "closed device");
        }
    }

    fn fd(&self) -> io::Result<RawFd> {
        self.file
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }

    /// Issue one ioctl, retrying while it is interrupted by a signal.
    ///
    /// `arg` must be the kernel struct `request` is defined for.
    fn control<T>(&self, request: vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        let fd = self.fd()?;
        loop {
            // SAFETY: `fd` is open for the lifetime of `self` and every caller in
            // this module pairs `request` with its matching `v4l_sys` struct.
            let result = unsafe { v4l2::ioctl(fd, request, (arg as *mut T).cast()) };
            match result {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    trace!(request, "ioctl interrupted, retrying");
                }
                result => return result,
            }
        }
    }

    fn buffer(index: u32) -> v4l2_buffer {
        // SAFETY: v4l2_buffer is plain old data; all-zero is a valid value.
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.index = index;
        buf.type_ = Type::VideoCapture as u32;
        buf.memory = Memory::Mmap as u32;
        buf
    }
}

impl VideoDevice for V4L2Device {
    type Region = MappedRegion;

    fn query_caps(&mut self) -> io::Result<DeviceCapabilities> {
        // SAFETY: plain old data.
        let mut raw: v4l2_capability = unsafe { mem::zeroed() };
        self.control(vidioc::VIDIOC_QUERYCAP, &mut raw)?;

        let bits = if raw.capabilities & CAP_DEVICE_CAPS == 0 {
            raw.capabilities
        } else {
            raw.device_caps
        };
        let flags = Flags::from_bits_truncate(bits);

        Ok(DeviceCapabilities {
            driver: c_string(&raw.driver),
            card: c_string(&raw.card),
            bus_info: c_string(&raw.bus_info),
            can_capture: flags.contains(Flags::VIDEO_CAPTURE),
            can_stream: flags.contains(Flags::STREAMING),
        })
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        // SAFETY: plain old data.
        let mut pix: v4l2_pix_format = unsafe { mem::zeroed() };
        pix.width = format.width;
        pix.height = format.height;
        pix.pixelformat = format.fourcc.to_u32();
        pix.field = FIELD_NONE;

        // SAFETY: plain old data.
        let mut raw: v4l2_format = unsafe { mem::zeroed() };
        raw.type_ = Type::VideoCapture as u32;
        raw.fmt.pix = pix;

        self.control(vidioc::VIDIOC_S_FMT, &mut raw)?;

        // SAFETY: the driver fills the `pix` member for capture buffers.
        Ok(pix_to_format(unsafe { raw.fmt.pix }))
    }

    fn format(&mut self) -> io::Result<Format> {
        // SAFETY: plain old data.
        let mut raw: v4l2_format = unsafe { mem::zeroed() };
        raw.type_ = Type::VideoCapture as u32;

        self.control(vidioc::VIDIOC_G_FMT, &mut raw)?;

        // SAFETY: the driver fills the `pix` member for capture buffers.
        Ok(pix_to_format(unsafe { raw.fmt.pix }))
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        // SAFETY: plain old data.
        let mut raw: v4l2_requestbuffers = unsafe { mem::zeroed() };
        raw.count = count;
        raw.type_ = Type::VideoCapture as u32;
        raw.memory = Memory::Mmap as u32;

        self.control(vidioc::VIDIOC_REQBUFS, &mut raw)?;
        Ok(raw.count)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let mut raw = Self::buffer(index);
        self.control(vidioc::VIDIOC_QUERYBUF, &mut raw)?;

        Ok(BufferInfo {
            index: raw.index,
            length: raw.length,
            // SAFETY: `offset` is the active member for mmap buffers.
            offset: unsafe { raw.m.offset },
        })
    }

    fn map_buffer(&mut self, length: u32, offset: u32) -> io::Result<MappedRegion> {
        let fd = self.fd()?;
        let len = usize::try_from(length)
            .map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))?;
        let offset = libc::off_t::try_from(offset)
            .map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))?;

        // SAFETY: a fresh shared mapping of a driver buffer; the kernel
        // validates `offset` against the buffers it handed out.
        let addr = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            )?
        };

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;
        Ok(MappedRegion { ptr, len })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut raw = Self::buffer(index);
        self.control(vidioc::VIDIOC_QBUF, &mut raw)
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let mut raw = Self::buffer(0);
        self.control(vidioc::VIDIOC_DQBUF, &mut raw)?;

        // V4L2 timestamps are non-negative in practice; clamp anything else to zero
        let secs = u64::try_from(raw.timestamp.tv_sec).unwrap_or(0);
        let micros = u32::try_from(raw.timestamp.tv_usec).unwrap_or(0);

        Ok(DequeuedBuffer {
            index: raw.index,
            bytes_used: raw.bytesused,
            sequence: raw.sequence,
            timestamp: Duration::new(secs, micros.saturating_mul(1000)),
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut buf_type = Type::VideoCapture as u32;
        self.control(vidioc::VIDIOC_STREAMON, &mut buf_type)
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut buf_type = Type::VideoCapture as u32;
        self.control(vidioc::VIDIOC_STREAMOFF, &mut buf_type)
    }

    fn wait_readable(&mut self, timeout: Duration) -> Readiness {
        let fd = match self.fd() {
            Ok(fd) => fd,
            Err(err) => return Readiness::Error(err),
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        loop {
            let mut pollfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };

            // SAFETY: a single valid pollfd on the stack.
            match unsafe { libc::poll(&mut pollfd, 1, timeout_ms) } {
                -1 => {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        trace!("poll interrupted, retrying");
                        continue;
                    }
                    return Readiness::Error(err);
                }
                0 => return Readiness::TimedOut,
                _ => return poll_readiness(pollfd.revents),
            }
        }
    }
}

/// A driver buffer mapped into process memory.
///
/// Unmapped on drop. The application only reads through it, and only while
/// the slot is dequeued.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl AsRef<[u8]> for MappedRegion {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: `ptr` is a live mapping of exactly `len` bytes until drop.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: unmaps the region created in `map_buffer`; no slices
        // borrowed from it can outlive `self`.
        if let Err(err) = unsafe { v4l2::munmap(self.ptr.as_ptr().cast(), self.len) } {
            warn!(error = %err, len = self.len, "munmap failed");
        }
    }
}

/// Readiness reported by a poll that returned an event.
fn poll_readiness(revents: libc::c_short) -> Readiness {
    if revents & libc::POLLERR == 0 {
        Readiness::Ready
    } else {
        // Drivers signal POLLERR when nothing is queued or streaming stopped
        Readiness::Error(io::Error::other("device reported POLLERR"))
    }
}

fn pix_to_format(pix: v4l2_pix_format) -> Format {
    Format {
        width: pix.width,
        height: pix.height,
        fourcc: FourCC::from_u32(pix.pixelformat),
        stride: pix.bytesperline,
        size: pix.sizeimage,
    }
}

/// Decode a NUL-padded C string field.
fn c_string(bytes: &[u8]) -> String {
    let text = bytes.split(|&b| b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(text).into_owned()
}
