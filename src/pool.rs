//! Memory-mapped buffer pool.
//!
//! The pool is an arena of driver buffers addressed by the slot index the
//! driver reports. Each slot carries an explicit ownership tag: `Queued`
//! slots belong to the device and may be written at any time, `Dequeued`
//! slots belong to the application and hold the latest captured frame.
//! Region contents are only handed out for `Dequeued` slots.

use tracing::{debug, info, warn};

use crate::error::{CaptureError, Result};
use crate::traits::{BufferInfo, VideoDevice};

/// Ownership state of a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Owned by the device; may be filled at any time.
    Queued,
    /// Owned by the application; holds a captured frame.
    Dequeued,
}

/// One mapped driver buffer.
#[derive(Debug)]
pub struct Slot<R> {
    info: BufferInfo,
    region: R,
    state: SlotState,
}

impl<R> Slot<R> {
    /// Slot index.
    pub const fn index(&self) -> u32 {
        self.info.index
    }

    /// Allocated capacity in bytes.
    pub const fn length(&self) -> u32 {
        self.info.length
    }

    /// Current ownership state.
    pub const fn state(&self) -> SlotState {
        self.state
    }
}

/// Fixed set of mapped driver buffers.
///
/// Mappings are created once in [`map_all`](Self::map_all) and released when
/// the pool is dropped; nothing is remapped in between.
#[derive(Debug)]
pub struct BufferPool<R> {
    slots: Vec<Slot<R>>,
}

impl<R: AsRef<[u8]>> BufferPool<R> {
    /// Ask the device for `requested` buffers and return how many it granted.
    ///
    /// Drivers may grant fewer buffers than requested. Granting more, or
    /// none at all, leaves the pool unusable and is reported as
    /// [`CaptureError::BufferCount`].
    pub fn negotiate<D: VideoDevice>(device: &mut D, requested: u32) -> Result<u32> {
        let granted = device
            .request_buffers(requested)
            .map_err(|source| CaptureError::BufferRequest { requested, source })?;

        if granted == 0 || granted > requested {
            return Err(CaptureError::BufferCount { requested, granted });
        }

        info!(requested, granted, "buffers negotiated");
        Ok(granted)
    }

    /// Map every granted buffer and hand it to the device queue.
    ///
    /// On error, buffers mapped so far are unmapped before returning.
    pub fn map_all<D>(device: &mut D, count: u32) -> Result<Self>
    where
        D: VideoDevice<Region = R>,
    {
        let mut slots = Vec::with_capacity(usize::try_from(count).unwrap_or_default());

        for index in 0..count {
            let info = device
                .query_buffer(index)
                .map_err(|source| CaptureError::BufferQuery { index, source })?;

            let region = device
                .map_buffer(info.length, info.offset)
                .map_err(|source| CaptureError::Map { index, source })?;

            // Keep the mapping owned by the pool before queueing, so a failed
            // queue still unmaps it on the way out.
            slots.push(Slot {
                info,
                region,
                state: SlotState::Queued,
            });

            device
                .queue_buffer(index)
                .map_err(|source| CaptureError::BufferEnqueue { index, source })?;

            debug!(index, length = info.length, offset = info.offset, "buffer mapped");
        }

        Ok(Self { slots })
    }

    /// Negotiate, map and queue `requested` buffers.
    ///
    /// If mapping fails, the driver's buffers are released again.
    pub fn allocate<D>(device: &mut D, requested: u32) -> Result<Self>
    where
        D: VideoDevice<Region = R>,
    {
        let granted = Self::negotiate(device, requested)?;

        match Self::map_all(device, granted) {
            Ok(pool) => Ok(pool),
            Err(err) => {
                if let Err(release) = device.request_buffers(0) {
                    warn!(error = %release, "failed to release buffers after setup error");
                }
                Err(err)
            }
        }
    }

    /// Number of slots in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up a slot by index.
    #[must_use]
    pub fn slot(&self, index: u32) -> Option<&Slot<R>> {
        self.slots.get(usize::try_from(index).ok()?)
    }

    /// Number of slots currently owned by the device.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Queued)
            .count()
    }

    /// The mapped memory of a dequeued slot.
    ///
    /// Returns `None` for an unknown index or a slot the device owns.
    #[must_use]
    pub fn region_for(&self, index: u32) -> Option<&[u8]> {
        self.slot(index)
            .filter(|slot| slot.state == SlotState::Dequeued)
            .map(|slot| slot.region.as_ref())
    }

    /// Record that the device returned slot `index` and borrow its memory.
    ///
    /// Fails with [`CaptureError::InvalidSlot`] for an unknown index or a
    /// slot the pool does not think the device owns.
    pub fn dequeue(&mut self, index: u32) -> Result<&[u8]> {
        let slot = self.transition(index, SlotState::Queued, SlotState::Dequeued)?;
        Ok(slot.region.as_ref())
    }

    /// Record that slot `index` was handed back to the device.
    pub fn mark_queued(&mut self, index: u32) -> Result<()> {
        self.transition(index, SlotState::Dequeued, SlotState::Queued)
            .map(|_| ())
    }

    /// Unmap every buffer, then ask the device to free them.
    pub fn release<D>(self, device: &mut D) -> Result<()>
    where
        D: VideoDevice<Region = R>,
    {
        let count = self.slots.len();
        drop(self);

        device
            .request_buffers(0)
            .map_err(|source| CaptureError::BufferRequest {
                requested: 0,
                source,
            })?;

        debug!(count, "buffers released");
        Ok(())
    }

    fn transition(&mut self, index: u32, from: SlotState, to: SlotState) -> Result<&mut Slot<R>> {
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| self.slots.get_mut(i))
            .filter(|slot| slot.state == from)
            .ok_or(CaptureError::InvalidSlot { index })?;

        slot.state = to;
        Ok(slot)
    }
}
