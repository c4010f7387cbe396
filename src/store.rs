//! Ring sample store
//!
//! Fixed-capacity circular buffer of raw sample frames. Every piece of
//! modulo arithmetic in the crate lives here: callers address samples by
//! *logical* index (0 = oldest surviving frame) and never see physical
//! offsets unless they ask for them.
//!
//! Once the ring is full, each append silently overwrites the oldest frame.
//! That is the defined behaviour, not an error.

use crate::error::{Result, TraceError};
use crate::types::SampleLayout;

/// Circular buffer of interleaved sample frames
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<u8>,
    layout: SampleLayout,
    frame_bytes: usize,
    capacity: u64,
    /// Physical offset of logical index 0
    start: u64,
    /// Valid frames, saturates at `capacity`
    count: u64,
    /// Frames ever appended since allocation
    total: u64,
}

impl RingBuffer {
    /// Allocate a ring holding `capacity` frames of `layout`
    pub fn new(capacity: u64, layout: SampleLayout) -> Result<Self> {
        if capacity == 0 {
            return Err(TraceError::InvalidCapacity(
                "ring capacity must be greater than zero".to_string(),
            ));
        }
        if !layout.is_supported() {
            return Err(TraceError::InvalidCapacity(format!(
                "layout {} is not supported",
                layout
            )));
        }
        let frame_bytes = layout.frame_bytes();
        let bytes = usize::try_from(capacity)
            .ok()
            .and_then(|c| c.checked_mul(frame_bytes))
            .ok_or_else(|| {
                TraceError::InvalidCapacity(format!(
                    "{} frames of {} bytes overflow the address space",
                    capacity, frame_bytes
                ))
            })?;

        Ok(Self {
            data: vec![0; bytes],
            layout,
            frame_bytes,
            capacity,
            start: 0,
            count: 0,
            total: 0,
        })
    }

    /// Append one frame, overwriting the oldest once full
    pub fn append(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() != self.frame_bytes {
            return Err(TraceError::FrameSize {
                expected: self.frame_bytes,
                actual: frame.len(),
            });
        }

        let cursor = self.write_cursor() as usize * self.frame_bytes;
        self.data[cursor..cursor + self.frame_bytes].copy_from_slice(frame);

        if self.count < self.capacity {
            self.count += 1;
        } else {
            self.start = (self.start + 1) % self.capacity;
        }
        self.total += 1;
        Ok(())
    }

    /// Raw bytes of the frame at `logical_index`
    pub fn read(&self, logical_index: u64) -> Result<&[u8]> {
        let physical = self.physical(logical_index)? as usize * self.frame_bytes;
        Ok(&self.data[physical..physical + self.frame_bytes])
    }

    /// Decoded raw value of channel `order` at `logical_index`
    pub fn value(&self, logical_index: u64, order: u16) -> Result<u64> {
        let frame = self.read(logical_index)?;
        self.layout
            .decode(frame, order)
            .ok_or(TraceError::UnknownChannel(order))
    }

    /// Physical frame offset of `logical_index`
    pub fn physical(&self, logical_index: u64) -> Result<u64> {
        if logical_index >= self.count {
            return Err(TraceError::OutOfRange {
                index: logical_index,
                count: self.count,
            });
        }
        Ok((self.start + logical_index) % self.capacity)
    }

    /// Physical offset of logical index 0
    #[inline]
    pub fn ring_start(&self) -> u64 {
        self.start
    }

    /// Physical offset of the newest frame, `None` while empty
    pub fn ring_end(&self) -> Option<u64> {
        self.count
            .checked_sub(1)
            .map(|last| (self.start + last) % self.capacity)
    }

    /// Physical offset the next append will write
    #[inline]
    pub fn write_cursor(&self) -> u64 {
        (self.start + self.count) % self.capacity
    }

    /// Number of valid frames
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    /// Frames appended since allocation, including overwritten ones
    #[inline]
    pub fn total_appended(&self) -> u64 {
        self.total
    }

    /// Frames lost to overwrite; also the absolute index of logical 0
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.total - self.count
    }

    #[inline]
    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    #[inline]
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Forget all frames, keeping the allocation
    pub fn clear(&mut self) {
        self.start = 0;
        self.count = 0;
        self.total = 0;
    }

    /// Iterate decoded values of `order` over `[start, start + len)`, clipped
    /// to the valid range
    pub fn values(&self, order: u16, start: u64, len: u64) -> impl Iterator<Item = u64> + '_ {
        let end = start.saturating_add(len).min(self.count);
        (start.min(end)..end).filter_map(move |i| self.value(i, order).ok())
    }
}
