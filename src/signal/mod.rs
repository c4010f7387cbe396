//! Signal adapters
//!
//! A signal adapter is the per-channel façade a renderer talks to. It holds
//! an `Arc` of the [`CaptureSession`] it reads from plus its own view and
//! calibration, and turns a pixel-space [`ViewRect`] into a lazy sequence of
//! draw primitives.
//!
//! # Variants
//!
//! - [`AnalogSignal`] - Polyline (raw) or per-pixel column rectangles (envelope)
//! - [`LogicSignal`] - Level and transition line segments
//! - [`SpectrumTrace`] - FFT magnitude polyline of an analog channel
//!
//! The variant set is closed; [`Signal`] dispatches to each through the
//! [`SignalAdapter`] trait.
//!
//! # Draw paths
//!
//! Below the envelope threshold (samples per pixel) adapters walk the ring
//! directly. At or above it they walk envelope buckets and emit at most one
//! primitive group per pixel column. Either way the returned
//! [`DrawPrimitives`] owns a read guard on the session and is finite.

pub mod analog;
pub mod cursor;
pub mod logic;
pub mod spectrum;

pub use analog::AnalogSignal;
pub use cursor::{format_time, Cursor, CursorSet};
pub use logic::{LogicSignal, Pulse};
pub use spectrum::SpectrumTrace;

use crate::envelope::{EnvelopeSample, SectionBounds};
use crate::mapper::{CoordinateMapper, SampleWindow};
use crate::session::{CaptureSession, SnapshotGuard};
use crate::types::{CaptureState, LineSegment, Point, Rect, ViewRect, ViewState};

/// Kind of a signal adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Analog,
    Logic,
    Spectrum,
}

/// Result of a hit test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Logical sample index, or bin index for a spectrum
    pub index: u64,
    /// Raw value, or displayed magnitude for a spectrum
    pub value: f64,
    /// Where the hit sample is drawn
    pub point: Point,
}

/// One draw primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// Vertex of a polyline
    Point(Point),
    Rect(Rect),
    Line(LineSegment),
}

/// Which path produced a primitive sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPath {
    /// Nothing to draw
    Empty,
    /// Walked raw samples
    Raw,
    /// Walked envelope buckets
    Envelope,
    /// Walked spectrum bins
    Spectrum,
}

enum PrimitiveIter<'a> {
    Empty,
    AnalogRaw(analog::TracePoints<'a>),
    AnalogEnvelope(analog::EnvelopeRects<'a>),
    LogicRaw(logic::LevelSegments<'a>),
    LogicEnvelope(logic::ActivitySegments<'a>),
    Spectrum(spectrum::SpectrumPoints<'a>),
}

/// Lazy, single-pass sequence of draw primitives
///
/// Holds a read guard on the session until dropped, so appends wait for the
/// renderer to finish with it.
pub struct DrawPrimitives<'a> {
    path: DrawPath,
    iter: PrimitiveIter<'a>,
}

impl<'a> DrawPrimitives<'a> {
    pub fn empty() -> Self {
        Self {
            path: DrawPath::Empty,
            iter: PrimitiveIter::Empty,
        }
    }

    fn new(path: DrawPath, iter: PrimitiveIter<'a>) -> Self {
        Self { path, iter }
    }

    /// Which path produced this sequence
    pub fn path(&self) -> DrawPath {
        self.path
    }
}

impl Iterator for DrawPrimitives<'_> {
    type Item = Primitive;

    fn next(&mut self) -> Option<Primitive> {
        match &mut self.iter {
            PrimitiveIter::Empty => None,
            PrimitiveIter::AnalogRaw(it) => it.next().map(Primitive::Point),
            PrimitiveIter::AnalogEnvelope(it) => it.next().map(Primitive::Rect),
            PrimitiveIter::LogicRaw(it) => it.next().map(Primitive::Line),
            PrimitiveIter::LogicEnvelope(it) => it.next().map(Primitive::Line),
            PrimitiveIter::Spectrum(it) => it.next().map(Primitive::Point),
        }
    }
}

/// Common interface of every signal adapter
pub trait SignalAdapter {
    fn kind(&self) -> SignalKind;

    /// Device channel index
    fn index(&self) -> u16;

    /// Capture state of the underlying session
    fn state(&self) -> CaptureState;

    /// Primitives for `rect`, empty while idle or without data
    fn draw_primitives(&self, rect: &ViewRect) -> DrawPrimitives<'_>;

    /// Sample under `point`, `None` outside the band or without data
    fn hit_test(&self, rect: &ViewRect, point: Point) -> Option<Hit>;

    /// Value at logical sample `index`, independent of zoom
    fn measure_at_cursor(&self, index: u64) -> Option<f64>;
}

/// Any signal adapter
pub enum Signal {
    Analog(AnalogSignal),
    Logic(LogicSignal),
    Spectrum(SpectrumTrace),
}

impl Signal {
    fn adapter(&self) -> &dyn SignalAdapter {
        match self {
            Signal::Analog(s) => s,
            Signal::Logic(s) => s,
            Signal::Spectrum(s) => s,
        }
    }
}

impl SignalAdapter for Signal {
    fn kind(&self) -> SignalKind {
        self.adapter().kind()
    }

    fn index(&self) -> u16 {
        self.adapter().index()
    }

    fn state(&self) -> CaptureState {
        self.adapter().state()
    }

    fn draw_primitives(&self, rect: &ViewRect) -> DrawPrimitives<'_> {
        self.adapter().draw_primitives(rect)
    }

    fn hit_test(&self, rect: &ViewRect, point: Point) -> Option<Hit> {
        self.adapter().hit_test(rect, point)
    }

    fn measure_at_cursor(&self, index: u64) -> Option<f64> {
        self.adapter().measure_at_cursor(index)
    }
}

impl From<AnalogSignal> for Signal {
    fn from(s: AnalogSignal) -> Self {
        Signal::Analog(s)
    }
}

impl From<LogicSignal> for Signal {
    fn from(s: LogicSignal) -> Self {
        Signal::Logic(s)
    }
}

impl From<SpectrumTrace> for Signal {
    fn from(s: SpectrumTrace) -> Self {
        Signal::Spectrum(s)
    }
}

/// Everything a time-domain draw call needs, captured under one guard
pub(crate) struct VisibleSpan<'a> {
    pub snapshot: SnapshotGuard<'a>,
    pub mapper: CoordinateMapper,
    pub window: SampleWindow,
}

impl<'a> VisibleSpan<'a> {
    /// Resolve the visible window of channel `order`
    ///
    /// `None` while idle, without data, or when the view is past the data.
    pub fn resolve(
        session: &'a CaptureSession,
        view: &ViewState,
        rect: &ViewRect,
        order: u16,
    ) -> Option<Self> {
        if !session.state().is_renderable() {
            return None;
        }
        let snapshot = session.snapshot();
        if !snapshot.has_channel(order) || !snapshot.have_data() {
            return None;
        }
        let mapper = CoordinateMapper::new(view, snapshot.samplerate());
        let window = mapper.visible_window(snapshot.sample_count(), rect.width)?;
        Some(Self {
            snapshot,
            mapper,
            window,
        })
    }

    /// Whether this span renders from the envelope index
    pub fn use_envelope(&self) -> bool {
        self.mapper.samples_per_pixel() >= self.snapshot.envelope().threshold()
    }

    /// Envelope buckets covering the window of `order`, `None` while hidden
    pub fn envelope_bounds(&self, order: u16) -> Option<SectionBounds> {
        if !self.snapshot.is_enabled(order) {
            return None;
        }
        let envelope = self.snapshot.envelope();
        let level = envelope.select_level(self.mapper.samples_per_pixel());
        let start = self.snapshot.first_absolute() + self.window.start;
        envelope.section(start, self.window.length, level, order)
    }
}

/// Envelope buckets merged into one summary per pixel column
///
/// Yields `(column, summary)` in increasing column order. Columns are
/// relative to the view's left edge and may fall outside it.
pub(crate) struct BucketColumns<'a> {
    snapshot: SnapshotGuard<'a>,
    order: u16,
    mapper: CoordinateMapper,
    first_absolute: u64,
    bounds: SectionBounds,
    next: u64,
    current: Option<(i64, EnvelopeSample)>,
}

impl<'a> BucketColumns<'a> {
    pub fn new(span: VisibleSpan<'a>, bounds: SectionBounds, order: u16) -> Self {
        let first_absolute = span.snapshot.first_absolute();
        Self {
            snapshot: span.snapshot,
            order,
            mapper: span.mapper,
            first_absolute,
            next: bounds.start,
            bounds,
            current: None,
        }
    }

    fn column_of(&self, bucket: u64) -> i64 {
        let logical = (bucket * self.bounds.scale) as f64 - self.first_absolute as f64;
        self.mapper.sample_to_pixel(logical).floor() as i64
    }
}

impl Iterator for BucketColumns<'_> {
    type Item = (i64, EnvelopeSample);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.bounds.end {
            let bucket = self.next;
            self.next += 1;
            let Some(sample) = self
                .snapshot
                .envelope()
                .bucket(self.order, self.bounds.level, bucket)
            else {
                continue;
            };

            let column = self.column_of(bucket);
            match self.current {
                Some((c, acc)) if c == column => self.current = Some((c, acc.merge(sample))),
                Some(done) => {
                    self.current = Some((column, sample));
                    return Some(done);
                }
                None => self.current = Some((column, sample)),
            }
        }
        self.current.take()
    }
}
