//! Capture session
//!
//! [`CaptureSession`] owns the ring store and the envelope index of one
//! capture behind a single [`RwLock`], so a frame's bytes and the
//! envelope buckets derived from it always publish together.
//!
//! # Locking
//!
//! - Appends and reallocations take the write lock.
//! - Renders take a read guard ([`SnapshotGuard`]) and keep it for the
//!   lifetime of their draw iterator, so they complete against the sample
//!   count they started with.
//! - The sample count and capture state are republished in atomics after
//!   every batch, for lock-free `have_data` / `sample_count` polling.
//!
//! A poisoned lock is recovered rather than propagated: the snapshot holds
//! plain data that stays consistent between appends.
//!
//! # State machine
//!
//! `Idle` → `Live` (start) → `Stopped` (stop) → `Idle` (clear). Starting
//! again from `Stopped` begins a fresh capture.

pub mod worker;

pub use worker::{CaptureEvent, CaptureWorker, WorkerStats};

use crate::config::{EnvelopeConfig, TraceConfig};
use crate::envelope::EnvelopeIndex;
use crate::error::{Result, TraceError};
use crate::store::RingBuffer;
use crate::types::{CaptureState, SampleLayout};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read guard over the capture data
pub type SnapshotGuard<'a> = RwLockReadGuard<'a, Snapshot>;

/// Capture data guarded by the session lock
#[derive(Debug)]
pub struct Snapshot {
    ring: Option<RingBuffer>,
    envelope: EnvelopeIndex,
    envelope_config: EnvelopeConfig,
    layout: SampleLayout,
    capacity: u64,
    samplerate: f64,
    /// Channel orders drawn from the envelope index
    enabled: Vec<bool>,
}

impl Snapshot {
    fn new(layout: SampleLayout, capacity: u64, samplerate: f64, envelope: &EnvelopeConfig) -> Self {
        Self {
            ring: None,
            envelope: EnvelopeIndex::new(envelope, capacity),
            envelope_config: *envelope,
            layout,
            capacity,
            samplerate,
            enabled: vec![true; layout.channel_count() as usize],
        }
    }

    /// Whether any frame is stored
    pub fn have_data(&self) -> bool {
        self.sample_count() > 0
    }

    /// Valid frames in the ring
    pub fn sample_count(&self) -> u64 {
        self.ring.as_ref().map_or(0, RingBuffer::count)
    }

    /// Absolute index of logical sample 0
    pub fn first_absolute(&self) -> u64 {
        self.ring.as_ref().map_or(0, RingBuffer::dropped)
    }

    /// Decoded value of channel `order` at `logical_index`
    pub fn value(&self, logical_index: u64, order: u16) -> Result<u64> {
        match &self.ring {
            Some(ring) => ring.value(logical_index, order),
            None => Err(TraceError::OutOfRange {
                index: logical_index,
                count: 0,
            }),
        }
    }

    pub fn ring(&self) -> Option<&RingBuffer> {
        self.ring.as_ref()
    }

    pub fn envelope(&self) -> &EnvelopeIndex {
        &self.envelope
    }

    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    /// Configured ring capacity in frames
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn samplerate(&self) -> f64 {
        self.samplerate
    }

    /// Whether `order` is part of the frame layout
    pub fn has_channel(&self, order: u16) -> bool {
        order < self.layout.channel_count()
    }

    /// Whether `order` renders from the envelope index
    pub fn is_enabled(&self, order: u16) -> bool {
        self.enabled.get(order as usize).copied().unwrap_or(false)
    }

    fn append_one(&mut self, frame: &[u8]) -> Result<()> {
        let Some(ring) = self.ring.as_mut() else {
            return Err(TraceError::InvalidState {
                from: CaptureState::Idle.as_str(),
                to: "append",
            });
        };
        ring.append(frame)?;

        // Every channel is summarised so bucket indices stay absolute
        for order in 0..self.layout.channel_count() {
            if let Some(value) = self.layout.decode(frame, order) {
                if !self.envelope.is_active(order) {
                    self.envelope.activate(order);
                }
                self.envelope.update(value, order);
            }
        }
        Ok(())
    }

    fn allocate(&mut self) -> Result<()> {
        let reusable = self
            .ring
            .as_ref()
            .is_some_and(|r| r.capacity() == self.capacity && r.layout() == self.layout);
        if reusable {
            if let Some(ring) = self.ring.as_mut() {
                ring.clear();
            }
            self.envelope.clear();
        } else {
            self.ring = Some(RingBuffer::new(self.capacity, self.layout)?);
            self.envelope = EnvelopeIndex::new(&self.envelope_config, self.capacity);
        }
        Ok(())
    }
}

/// One capture: ring store, envelope index and lifecycle state
#[derive(Debug)]
pub struct CaptureSession {
    inner: RwLock<Snapshot>,
    state: AtomicU8,
    published: AtomicU64,
}

impl CaptureSession {
    /// Idle session sized from `config`
    pub fn new(config: &TraceConfig) -> Self {
        Self::with_layout(
            config.capture.layout,
            config.capture.sample_limit,
            config.capture.samplerate,
            config.envelope,
        )
    }

    /// Idle session for `capacity` frames of `layout`
    pub fn with_layout(
        layout: SampleLayout,
        capacity: u64,
        samplerate: f64,
        envelope_config: EnvelopeConfig,
    ) -> Self {
        Self {
            inner: RwLock::new(Snapshot::new(layout, capacity, samplerate, &envelope_config)),
            state: AtomicU8::new(CaptureState::Idle.to_u8()),
            published: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Lock-free check for renderable data
    pub fn have_data(&self) -> bool {
        self.state().is_renderable() && self.sample_count() > 0
    }

    /// Sample count as of the last completed batch
    #[inline]
    pub fn sample_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Read guard for rendering and queries
    pub fn snapshot(&self) -> SnapshotGuard<'_> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: CaptureState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    fn publish(&self, snapshot: &Snapshot) {
        self.published.store(snapshot.sample_count(), Ordering::Release);
    }

    /// Begin a capture, allocating (or reusing) the ring
    pub fn start(&self) -> Result<()> {
        let mut snapshot = self.write();
        let from = self.state();
        if from == CaptureState::Live {
            return Err(TraceError::InvalidState {
                from: from.as_str(),
                to: CaptureState::Live.as_str(),
            });
        }

        snapshot.allocate()?;
        tracing::debug!(
            layout = %snapshot.layout,
            capacity = snapshot.capacity,
            "capture started"
        );
        self.publish(&snapshot);
        self.set_state(CaptureState::Live);
        Ok(())
    }

    /// Freeze the capture; the data stays queryable
    pub fn stop(&self) -> Result<()> {
        // Serialised with appends so no frame lands after the transition
        let _snapshot = self.write();
        let from = self.state();
        match from {
            CaptureState::Live => {
                self.set_state(CaptureState::Stopped);
                tracing::debug!(samples = self.sample_count(), "capture stopped");
                Ok(())
            }
            CaptureState::Stopped => Ok(()),
            CaptureState::Idle => Err(TraceError::InvalidState {
                from: from.as_str(),
                to: CaptureState::Stopped.as_str(),
            }),
        }
    }

    /// Drop the captured data and return to `Idle`
    pub fn clear(&self) {
        let mut snapshot = self.write();
        snapshot.ring = None;
        snapshot.envelope.clear();
        self.publish(&snapshot);
        self.set_state(CaptureState::Idle);
    }

    /// Change the frame layout or ring capacity
    ///
    /// Reallocates under the write lock; readers block until it completes.
    /// A live capture continues into the new, empty ring.
    pub fn reconfigure(&self, layout: SampleLayout, capacity: u64) -> Result<()> {
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
        let mut snapshot = self.write();
        if snapshot.layout == layout && snapshot.capacity == capacity {
            return Ok(());
        }

        tracing::debug!(
            from = %snapshot.layout,
            to = %layout,
            capacity,
            "reallocating capture ring"
        );
        snapshot.layout = layout;
        snapshot.capacity = capacity;
        snapshot.enabled = vec![true; layout.channel_count() as usize];
        snapshot.envelope = EnvelopeIndex::new(&snapshot.envelope_config, capacity);
        if snapshot.ring.is_some() {
            snapshot.ring = Some(RingBuffer::new(capacity, layout)?);
        }
        self.publish(&snapshot);
        Ok(())
    }

    pub fn set_samplerate(&self, samplerate: f64) {
        if samplerate > 0.0 && samplerate.is_finite() {
            self.write().samplerate = samplerate;
        } else {
            tracing::warn!(samplerate, "ignoring invalid samplerate");
        }
    }

    pub fn samplerate(&self) -> f64 {
        self.snapshot().samplerate
    }

    /// Show or hide channel `order` on the envelope draw path
    ///
    /// The envelope keeps summarising a hidden channel, so it can be shown
    /// again at any point of the capture.
    pub fn set_channel_enabled(&self, order: u16, enabled: bool) -> Result<()> {
        let mut snapshot = self.write();
        let slot = snapshot
            .enabled
            .get_mut(order as usize)
            .ok_or(TraceError::UnknownChannel(order))?;
        *slot = enabled;
        Ok(())
    }

    /// Append one frame to a live capture
    pub fn append(&self, frame: &[u8]) -> Result<()> {
        let mut snapshot = self.write();
        self.require_live()?;
        let result = snapshot.append_one(frame);
        self.publish(&snapshot);
        result
    }

    /// Append a batch of whole frames, returning how many were stored
    pub fn append_frames(&self, bytes: &[u8]) -> Result<usize> {
        let mut snapshot = self.write();
        self.require_live()?;
        let frame_bytes = snapshot.layout.frame_bytes();
        if frame_bytes == 0 || bytes.len() % frame_bytes != 0 {
            return Err(TraceError::FrameSize {
                expected: frame_bytes,
                actual: bytes.len(),
            });
        }

        let mut stored = 0;
        for frame in bytes.chunks_exact(frame_bytes) {
            if let Err(e) = snapshot.append_one(frame) {
                self.publish(&snapshot);
                return Err(e);
            }
            stored += 1;
        }
        self.publish(&snapshot);
        Ok(stored)
    }

    fn require_live(&self) -> Result<()> {
        let state = self.state();
        if state == CaptureState::Live {
            Ok(())
        } else {
            Err(TraceError::InvalidState {
                from: state.as_str(),
                to: "append",
            })
        }
    }
}
