//! Mock device implementation for testing without hardware.
//!
//! `MockDevice` models the kernel side of the mmap streaming protocol: a
//! buffer array granted by `request_buffers`, a FIFO of queued slots, and
//! per-operation fault injection. Every trait call is logged so tests can
//! assert that no device I/O happened.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::traits::{
    BufferInfo, DequeuedBuffer, DeviceCapabilities, Format, FourCC, Readiness, VideoDevice,
};

/// Page size used to lay out fake mapping offsets.
const PAGE_SIZE: u32 = 4096;

/// Operations that can be made to fail with an errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `VIDIOC_QUERYCAP`.
    QueryCaps,
    /// `VIDIOC_S_FMT`.
    SetFormat,
    /// `VIDIOC_G_FMT`.
    GetFormat,
    /// `VIDIOC_REQBUFS`.
    RequestBuffers,
    /// `VIDIOC_STREAMON`.
    StreamOn,
    /// `VIDIOC_STREAMOFF`.
    StreamOff,
    /// `VIDIOC_DQBUF`.
    Dequeue,
    /// `VIDIOC_QBUF` once streaming has started.
    Requeue,
}

/// Scripted outcome for the next readiness wait.
#[derive(Debug, Clone, Copy)]
pub enum MockWait {
    /// Report a timeout.
    TimedOut,
    /// Report a failed wait with this errno.
    Error(i32),
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// A fake mapping. Tracks how many regions are alive so tests can check
/// that teardown unmaps everything.
#[derive(Debug)]
pub struct MockRegion {
    data: Vec<u8>,
    live: Rc<Cell<usize>>,
}

impl AsRef<[u8]> for MockRegion {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockRegion {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    adjusted: Option<Format>,
    pattern: TestPattern,
    max_buffers: u32,
    granted: Option<u32>,
    bytes_used: Option<u32>,
    buffers: Vec<BufferInfo>,
    queue: VecDeque<u32>,
    streaming: bool,
    frame_count: u32,
    faults: HashMap<MockOp, i32>,
    query_fault: Option<u32>,
    map_fault: Option<u32>,
    queue_fault: Option<u32>,
    misreported_slot: Option<u32>,
    waits: VecDeque<MockWait>,
    live: Rc<Cell<usize>>,
    calls: Vec<&'static str>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            adjusted: None,
            pattern: TestPattern::ColorBars,
            max_buffers: 32,
            granted: None,
            bytes_used: None,
            buffers: Vec::new(),
            queue: VecDeque::new(),
            streaming: false,
            frame_count: 0,
            faults: HashMap::new(),
            query_fault: None,
            map_fault: None,
            queue_fault: None,
            misreported_slot: None,
            waits: VecDeque::new(),
            live: Rc::new(Cell::new(0)),
            calls: Vec::new(),
        }
    }

    /// Set the capabilities for this mock device.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make the driver substitute `format` for whatever is requested.
    #[must_use]
    pub fn with_adjusted_format(mut self, format: Format) -> Self {
        self.adjusted = Some(format);
        self
    }

    /// Set the test pattern buffers are filled with.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Grant exactly `count` buffers regardless of the request.
    #[must_use]
    pub const fn with_granted(mut self, count: u32) -> Self {
        self.granted = Some(count);
        self
    }

    /// Report `bytes` as the filled length of every dequeued buffer.
    #[must_use]
    pub const fn with_bytes_used(mut self, bytes: u32) -> Self {
        self.bytes_used = Some(bytes);
        self
    }

    /// Fail every call of `op` with `errno`.
    #[must_use]
    pub fn failing(mut self, op: MockOp, errno: i32) -> Self {
        self.faults.insert(op, errno);
        self
    }

    /// Fail querying buffer `index` with `EINVAL`.
    #[must_use]
    pub const fn failing_query_at(mut self, index: u32) -> Self {
        self.query_fault = Some(index);
        self
    }

    /// Fail mapping buffer `index` with `ENOMEM`.
    #[must_use]
    pub const fn failing_map_at(mut self, index: u32) -> Self {
        self.map_fault = Some(index);
        self
    }

    /// Fail the initial queueing of buffer `index` with `EINVAL`.
    #[must_use]
    pub const fn failing_queue_at(mut self, index: u32) -> Self {
        self.queue_fault = Some(index);
        self
    }

    /// Fail `op` from now on.
    pub fn inject(&mut self, op: MockOp, errno: i32) {
        self.faults.insert(op, errno);
    }

    /// Make the next dequeue report slot `index` instead of the one it takes
    /// off the queue.
    pub fn misreport_next_slot(&mut self, index: u32) {
        self.misreported_slot = Some(index);
    }

    /// Script the outcome of the next readiness wait.
    pub fn script_wait(&mut self, outcome: MockWait) {
        self.waits.push_back(outcome);
    }

    /// Names of the trait methods called so far, in order.
    #[must_use]
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    /// Slot indices currently queued, in delivery order.
    #[must_use]
    pub fn queued(&self) -> Vec<u32> {
        self.queue.iter().copied().collect()
    }

    /// Number of buffers the driver currently has allocated.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.buffers.len()
    }

    /// Number of regions mapped and not yet dropped.
    #[must_use]
    pub fn live_mappings(&self) -> usize {
        self.live.get()
    }

    /// Whether streaming is on.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn fault(&self, op: MockOp) -> io::Result<()> {
        self.faults
            .get(&op)
            .map_or(Ok(()), |&errno| Err(io::Error::from_raw_os_error(errno)))
    }
}

impl VideoDevice for MockDevice {
    type Region = MockRegion;

    fn query_caps(&mut self) -> io::Result<DeviceCapabilities> {
        self.calls.push("query_caps");
        self.fault(MockOp::QueryCaps)?;
        Ok(self.capabilities.clone())
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        self.calls.push("set_format");
        self.fault(MockOp::SetFormat)?;
        self.format = self.adjusted.clone().unwrap_or_else(|| format.clone());
        Ok(self.format.clone())
    }

    fn format(&mut self) -> io::Result<Format> {
        self.calls.push("format");
        self.fault(MockOp::GetFormat)?;
        Ok(self.format.clone())
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        self.calls.push("request_buffers");
        self.fault(MockOp::RequestBuffers)?;

        if self.streaming || (count == 0 && self.live.get() > 0) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }

        self.queue.clear();
        let granted = if count == 0 {
            0
        } else {
            self.granted.unwrap_or_else(|| count.min(self.max_buffers))
        };

        let length = self.format.size;
        let stride = length.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        self.buffers = (0..granted)
            .map(|index| BufferInfo {
                index,
                length,
                offset: index * stride,
            })
            .collect();

        Ok(granted)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        self.calls.push("query_buffer");
        if self.query_fault == Some(index) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        usize::try_from(index)
            .ok()
            .and_then(|i| self.buffers.get(i))
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
    }

    fn map_buffer(&mut self, length: u32, offset: u32) -> io::Result<MockRegion> {
        self.calls.push("map_buffer");
        let info = self
            .buffers
            .iter()
            .find(|info| info.offset == offset && info.length == length)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;

        if self.map_fault == Some(info.index) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }

        let mut data = generate_test_frame(&self.format, self.pattern);
        data.resize(usize::try_from(length).unwrap_or_default(), 0);

        self.live.set(self.live.get() + 1);
        Ok(MockRegion {
            data,
            live: Rc::clone(&self.live),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        self.calls.push("queue_buffer");
        if self.streaming {
            self.fault(MockOp::Requeue)?;
        } else if self.queue_fault == Some(index) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        let known = usize::try_from(index).is_ok_and(|i| i < self.buffers.len());
        if !known || self.queue.contains(&index) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        self.queue.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        self.calls.push("dequeue_buffer");
        self.fault(MockOp::Dequeue)?;

        if !self.streaming {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let index = self
            .queue
            .pop_front()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EAGAIN))?;
        let index = self.misreported_slot.take().unwrap_or(index);

        let sequence = self.frame_count;
        self.frame_count += 1;

        Ok(DequeuedBuffer {
            index,
            bytes_used: self.bytes_used.unwrap_or(self.format.size),
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.calls.push("stream_on");
        self.fault(MockOp::StreamOn)?;
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.calls.push("stream_off");
        self.fault(MockOp::StreamOff)?;
        self.streaming = false;
        self.queue.clear();
        Ok(())
    }

    fn wait_readable(&mut self, _timeout: Duration) -> Readiness {
        self.calls.push("wait_readable");
        match self.waits.pop_front() {
            Some(MockWait::TimedOut) => Readiness::TimedOut,
            Some(MockWait::Error(errno)) => Readiness::Error(io::Error::from_raw_os_error(errno)),
            None if self.streaming && !self.queue.is_empty() => Readiness::Ready,
            None => Readiness::TimedOut,
        }
    }
}

/// Generate YUYV test frame data based on pattern.
pub fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let size = format.width as usize * format.height as usize * 2; // YUYV = 2 bytes/pixel
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => generate_color_bars(&mut data, format.width),
        TestPattern::Gradient => generate_gradient(&mut data, format.width),
        TestPattern::Solid(y, u, v) => fill_pairs(&mut data, |_| (y, u, v)),
    }

    data
}

/// Fill every row with pixel pairs chosen by x coordinate.
fn fill_pairs<F>(data: &mut [u8], pair: F)
where
    F: Fn(u32) -> (u8, u8, u8),
{
    for (i, group) in data.chunks_exact_mut(4).enumerate() {
        let (y, u, v) = pair(u32::try_from(i).unwrap_or(u32::MAX));
        group.copy_from_slice(&[y, u, y, v]);
    }
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];

    let pairs_per_row = (width / 2).max(1);
    let bar_width = (width / 8).max(1);
    fill_pairs(data, |pair| {
        let x = (pair % pairs_per_row) * 2;
        let bar = usize::try_from(x / bar_width).unwrap_or(7).min(7);
        bars.get(bar).copied().unwrap_or((16, 128, 128))
    });
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32) {
    let pairs_per_row = (width / 2).max(1);
    fill_pairs(data, |pair| {
        let x = (pair % pairs_per_row) * 2;
        let y = u8::try_from(x * 255 / width.max(1)).unwrap_or(u8::MAX);
        (y, 128, 128)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let mut device = MockDevice::new();
        let caps = device.query_caps().expect("query_caps should succeed");
        assert_eq!(caps.driver, "mock");
        assert!(caps.can_capture);
        assert!(caps.can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::YUYV);
        let actual = device
            .set_format(&new_format)
            .expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);
    }

    #[test]
    fn test_mock_device_adjusts_format() {
        let mut device =
            MockDevice::new().with_adjusted_format(Format::new(320, 240, FourCC::YUYV));
        let actual = device
            .set_format(&Format::new(640, 480, FourCC::YUYV))
            .expect("set_format should succeed");
        assert_eq!(actual.width, 320);
    }

    #[test]
    fn test_mock_queue_is_fifo() {
        let mut device = MockDevice::new();
        assert_eq!(device.request_buffers(3).expect("reqbufs"), 3);
        for index in 0..3 {
            device.queue_buffer(index).expect("queue");
        }
        assert!(device.queue_buffer(1).is_err(), "double queue must fail");

        device.stream_on().expect("stream_on");
        let first = device.dequeue_buffer().expect("dequeue");
        let second = device.dequeue_buffer().expect("dequeue");
        assert_eq!((first.index, first.sequence), (0, 0));
        assert_eq!((second.index, second.sequence), (1, 1));
    }

    #[test]
    fn test_mock_wait_script() {
        let mut device = MockDevice::new();
        device.script_wait(MockWait::Error(libc::EIO));
        device.script_wait(MockWait::TimedOut);

        assert!(matches!(
            device.wait_readable(Duration::from_secs(2)),
            Readiness::Error(_)
        ));
        assert!(matches!(
            device.wait_readable(Duration::from_secs(2)),
            Readiness::TimedOut
        ));
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        assert_eq!(data.len(), 640 * 480 * 2);
        // First bar white, last bar black
        assert_eq!(&data[..4], &[235, 128, 235, 128]);
        assert_eq!(&data[1276..1280], &[16, 128, 16, 128]);
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = 479 * 640 * 2;
        let last_pixel_y = data[last_row_start + 638 * 2];
        assert!(last_pixel_y > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));

        assert_eq!(&data[..4], &[128, 64, 128, 192]);
        assert!(data.chunks_exact(4).all(|g| g == [128, 64, 128, 192]));
    }
}
