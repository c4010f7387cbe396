//! Logic channel adapter
//!
//! Logic values are single bits. The raw path draws a level line per run
//! and a vertical line per transition. The envelope path draws one vertical
//! activity line for every pixel column whose buckets hold both levels and a
//! level line for every steady column.
//!
//! Edge counting skips whole level-0 buckets that hold a single level, so it
//! only reads raw samples around transitions.

use super::{
    BucketColumns, DrawPath, DrawPrimitives, Hit, PrimitiveIter, SignalAdapter, SignalKind,
    VisibleSpan,
};
use crate::envelope::EnvelopeSample;
use crate::mapper::CoordinateMapper;
use crate::session::{CaptureSession, Snapshot, SnapshotGuard};
use crate::types::{Band, CaptureState, LineSegment, Point, ViewRect, ViewState};
use std::sync::Arc;

/// A pulse around a sample: the run containing it and the next transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Level of the run
    pub level: u64,
    /// First sample of the run
    pub start: u64,
    /// First sample after the run
    pub end: u64,
    /// First sample after the following run, if it ends inside the capture
    pub next: Option<u64>,
}

impl Pulse {
    /// Run length in samples
    pub fn width(&self) -> u64 {
        self.end - self.start
    }

    /// Full period in samples
    pub fn period(&self) -> Option<u64> {
        self.next.map(|n| n - self.start)
    }
}

/// Adapter drawing one logic channel
pub struct LogicSignal {
    session: Arc<CaptureSession>,
    index: u16,
    order: u16,
    view: ViewState,
    band: Band,
}

impl LogicSignal {
    pub fn new(session: Arc<CaptureSession>, index: u16, order: u16) -> Self {
        Self {
            session,
            index,
            order,
            view: ViewState::default(),
            band: Band::new(0.0, 20.0),
        }
    }

    pub fn with_band(mut self, band: Band) -> Self {
        self.band = band;
        self
    }

    pub fn with_view(mut self, view: ViewState) -> Self {
        self.view = view;
        self
    }

    pub fn set_band(&mut self, band: Band) {
        self.band = band;
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn set_view(&mut self, view: ViewState) {
        self.view = view;
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn order(&self) -> u16 {
        self.order
    }

    fn level_y(&self, level: u64) -> f64 {
        if level != 0 {
            self.band.top
        } else {
            self.band.bottom
        }
    }

    fn snapshot(&self) -> Option<SnapshotGuard<'_>> {
        if !self.state().is_renderable() {
            return None;
        }
        let snapshot = self.session.snapshot();
        snapshot.have_data().then_some(snapshot)
    }

    /// Rising and falling transitions between logical samples `[start, end)`
    pub fn edges(&self, start: u64, end: u64) -> Option<(u64, u64)> {
        let snapshot = self.snapshot()?;
        let end = end.min(snapshot.sample_count());
        if start >= end {
            return Some((0, 0));
        }
        count_edges(&snapshot, self.order, start, end)
    }

    /// Transition nearest to `point`, within `radius` pixels
    ///
    /// Returns the index of the first sample after the transition.
    pub fn nearest_edge(&self, rect: &ViewRect, point: Point, radius: f64) -> Option<u64> {
        let snapshot = self.snapshot()?;
        let mapper = CoordinateMapper::new(&self.view, snapshot.samplerate());
        let center = mapper.pixel_to_sample(point.x - rect.left)?;
        let count = snapshot.sample_count();
        let reach = (radius.max(0.0) * mapper.samples_per_pixel()).ceil() as u64;

        let is_edge = |i: u64| -> bool {
            if i == 0 || i >= count {
                return false;
            }
            match (snapshot.value(i - 1, self.order), snapshot.value(i, self.order)) {
                (Ok(a), Ok(b)) => a != b,
                _ => false,
            }
        };

        (0..=reach).find_map(|d| {
            if is_edge(center.saturating_add(d)) {
                Some(center + d)
            } else if d <= center && is_edge(center - d) {
                Some(center - d)
            } else {
                None
            }
        })
    }

    /// The pulse containing logical sample `index`
    pub fn pulse_at(&self, index: u64) -> Option<Pulse> {
        let snapshot = self.snapshot()?;
        let count = snapshot.sample_count();
        let value = |i: u64| snapshot.value(i, self.order).ok();
        let level = value(index)?;

        let mut start = index;
        while start > 0 && value(start - 1)? == level {
            start -= 1;
        }
        // Run touching the oldest sample has no known start
        if start == 0 {
            return None;
        }

        let mut end = index + 1;
        while end < count && value(end)? == level {
            end += 1;
        }
        if end >= count {
            return None;
        }

        let mut next = end + 1;
        while next < count && value(next)? != level {
            next += 1;
        }
        Some(Pulse {
            level,
            start,
            end,
            next: (next < count).then_some(next),
        })
    }
}

impl SignalAdapter for LogicSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Logic
    }

    fn index(&self) -> u16 {
        self.index
    }

    fn state(&self) -> CaptureState {
        self.session.state()
    }

    fn draw_primitives(&self, rect: &ViewRect) -> DrawPrimitives<'_> {
        let Some(span) = VisibleSpan::resolve(&self.session, &self.view, rect, self.order) else {
            return DrawPrimitives::empty();
        };
        let high_y = self.level_y(1);
        let low_y = self.level_y(0);

        if !span.use_envelope() {
            let segments = LevelSegments {
                mapper: span.mapper,
                order: self.order,
                left: rect.left,
                right: rect.right(),
                high_y,
                low_y,
                next: span.window.start,
                end: span.window.end(),
                snapshot: span.snapshot,
                level: None,
                run_start: rect.left,
                pending: None,
                finished: false,
            };
            return DrawPrimitives::new(DrawPath::Raw, PrimitiveIter::LogicRaw(segments));
        }

        let Some(bounds) = span.envelope_bounds(self.order) else {
            tracing::trace!(order = self.order, "no envelope for channel");
            return DrawPrimitives::empty();
        };
        DrawPrimitives::new(
            DrawPath::Envelope,
            PrimitiveIter::LogicEnvelope(ActivitySegments {
                columns: BucketColumns::new(span, bounds, self.order),
                left: rect.left,
                width: rect.width,
                high_y,
                low_y,
                previous: None,
                pending: None,
            }),
        )
    }

    fn hit_test(&self, rect: &ViewRect, point: Point) -> Option<Hit> {
        if !rect.contains(point) || !self.band.contains(point.y) {
            return None;
        }
        let snapshot = self.snapshot()?;
        let mapper = CoordinateMapper::new(&self.view, snapshot.samplerate());
        let index = mapper.pixel_to_sample(point.x - rect.left)?;
        let level = snapshot.value(index, self.order).ok()?;
        Some(Hit {
            index,
            value: level as f64,
            point: Point::new(
                rect.left + mapper.sample_to_pixel(index as f64),
                self.level_y(level),
            ),
        })
    }

    fn measure_at_cursor(&self, index: u64) -> Option<f64> {
        let snapshot = self.snapshot()?;
        snapshot.value(index, self.order).ok().map(|v| v as f64)
    }
}

fn count_edges(snapshot: &Snapshot, order: u16, start: u64, end: u64) -> Option<(u64, u64)> {
    let envelope = snapshot.envelope();
    let first = snapshot.first_absolute();
    let scale = envelope.scales().first().copied().unwrap_or(1).max(1);
    let summarised = envelope.is_active(order);

    let mut prev = snapshot.value(start, order).ok()?;
    let (mut rising, mut falling) = (0, 0);
    let mut i = start + 1;
    while i < end {
        let abs = first + i;
        if summarised && abs % scale == 0 && abs + scale <= first + end {
            let steady = envelope
                .bucket(order, 0, abs / scale)
                .is_some_and(|b| b.min == prev && b.max == prev);
            if steady {
                i += scale;
                continue;
            }
        }

        let v = snapshot.value(i, order).ok()?;
        if v != prev {
            if v > prev {
                rising += 1;
            } else {
                falling += 1;
            }
            prev = v;
        }
        i += 1;
    }
    Some((rising, falling))
}

/// Raw-path level and transition segments
pub struct LevelSegments<'a> {
    snapshot: SnapshotGuard<'a>,
    mapper: CoordinateMapper,
    order: u16,
    left: f64,
    right: f64,
    high_y: f64,
    low_y: f64,
    next: u64,
    end: u64,
    level: Option<u64>,
    run_start: f64,
    pending: Option<LineSegment>,
    finished: bool,
}

impl LevelSegments<'_> {
    fn x(&self, index: u64) -> f64 {
        self.left + self.mapper.sample_to_pixel(index as f64)
    }

    fn y(&self, level: u64) -> f64 {
        if level != 0 {
            self.high_y
        } else {
            self.low_y
        }
    }
}

impl Iterator for LevelSegments<'_> {
    type Item = LineSegment;

    fn next(&mut self) -> Option<LineSegment> {
        if let Some(segment) = self.pending.take() {
            return Some(segment);
        }
        if self.finished {
            return None;
        }

        while self.next < self.end {
            let index = self.next;
            self.next += 1;
            let Ok(value) = self.snapshot.value(index, self.order) else {
                continue;
            };

            match self.level {
                None => {
                    self.level = Some(value);
                    self.run_start = self.x(index).max(self.left);
                }
                Some(level) if level != value => {
                    let x = self.x(index);
                    if x > self.right {
                        break;
                    }
                    let (from, to) = (self.y(level), self.y(value));
                    let run = LineSegment::new(self.run_start, from, x, from);
                    self.pending = Some(LineSegment::new(x, from, x, to));
                    self.level = Some(value);
                    self.run_start = x;
                    return Some(run);
                }
                Some(_) => {}
            }
        }

        self.finished = true;
        let level = self.level?;
        let y = self.y(level);
        let x = self.x(self.end).min(self.right);
        Some(LineSegment::new(self.run_start, y, x, y))
    }
}

/// Envelope-path activity segments, at most two per pixel column
pub struct ActivitySegments<'a> {
    columns: BucketColumns<'a>,
    left: f64,
    width: f64,
    high_y: f64,
    low_y: f64,
    previous: Option<EnvelopeSample>,
    pending: Option<LineSegment>,
}

impl Iterator for ActivitySegments<'_> {
    type Item = LineSegment;

    fn next(&mut self) -> Option<LineSegment> {
        if let Some(segment) = self.pending.take() {
            return Some(segment);
        }

        while let Some((column, sample)) = self.columns.next() {
            let previous = self.previous.replace(sample);
            if column < 0 || column as f64 >= self.width {
                continue;
            }

            let x = self.left + column as f64;
            let activity = LineSegment::new(x, self.high_y, x, self.low_y);
            if sample.has_transition() {
                return Some(activity);
            }

            let y = if sample.min != 0 { self.high_y } else { self.low_y };
            let level = LineSegment::new(x, y, x + 1.0, y);
            // Transition on a column boundary between two steady columns
            let changed = previous.is_some_and(|p| !p.has_transition() && p.min != sample.min);
            if changed {
                self.pending = Some(level);
                return Some(activity);
            }
            return Some(level);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvelopeConfig;
    use crate::signal::Primitive;
    use crate::types::SampleLayout;

    const RATE: f64 = 1_024.0;

    fn session_with(bits: &[u8]) -> Arc<CaptureSession> {
        let session = Arc::new(CaptureSession::with_layout(
            SampleLayout::Logic { channel_count: 8 },
            1 << 16,
            RATE,
            EnvelopeConfig::default(),
        ));
        session.start().unwrap();
        session.append_frames(bits).unwrap();
        session
    }

    fn signal(session: Arc<CaptureSession>, spp: f64) -> LogicSignal {
        LogicSignal::new(session, 0, 0)
            .with_band(Band::new(0.0, 20.0))
            .with_view(ViewState::from_samples_per_pixel(spp, RATE, 0))
    }

    fn lines(signal: &LogicSignal, rect: &ViewRect) -> Vec<LineSegment> {
        signal
            .draw_primitives(rect)
            .map(|p| match p {
                Primitive::Line(l) => l,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_raw_segments() {
        let sig = signal(session_with(&[0, 0, 1, 1, 0]), 1.0);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 20.0);
        assert_eq!(sig.draw_primitives(&rect).path(), DrawPath::Raw);
        assert_eq!(
            lines(&sig, &rect),
            vec![
                LineSegment::new(0.0, 20.0, 2.0, 20.0),
                LineSegment::new(2.0, 20.0, 2.0, 0.0),
                LineSegment::new(2.0, 0.0, 4.0, 0.0),
                LineSegment::new(4.0, 0.0, 4.0, 20.0),
                LineSegment::new(4.0, 20.0, 5.0, 20.0),
            ]
        );
    }

    #[test]
    fn test_raw_segments_clipped_to_rect() {
        let bits: Vec<u8> = (0..1000).map(|i| (i / 7 % 2) as u8).collect();
        let sig = signal(session_with(&bits), 1.0);
        let rect = ViewRect::new(0.0, 0.0, 50.0, 20.0);
        let segs = lines(&sig, &rect);
        assert!(segs
            .iter()
            .all(|s| s.from.x >= 0.0 && s.to.x <= 50.0 && s.from.x <= s.to.x));
    }

    #[test]
    fn test_envelope_activity() {
        // Toggle every 4 samples: every 16-sample bucket holds both levels
        let bits: Vec<u8> = (0..8192).map(|i| (i / 4 % 2) as u8).collect();
        let sig = signal(session_with(&bits), 32.0);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 20.0);
        assert_eq!(sig.draw_primitives(&rect).path(), DrawPath::Envelope);
        let segs = lines(&sig, &rect);
        assert_eq!(segs.len(), 100);
        assert!(segs.iter().all(|s| s.from.x == s.to.x && s.from.y == 0.0 && s.to.y == 20.0));
    }

    #[test]
    fn test_envelope_steady_columns_join() {
        // 64-sample runs at 32 samples per pixel: level changes on column edges
        let bits: Vec<u8> = (0..8192).map(|i| (i / 64 % 2) as u8).collect();
        let sig = signal(session_with(&bits), 32.0);
        let rect = ViewRect::new(0.0, 0.0, 8.0, 20.0);
        let segs = lines(&sig, &rect);
        // Eight level segments plus verticals at columns 2, 4 and 6
        assert_eq!(segs.len(), 11);
        assert_eq!(segs[2], LineSegment::new(2.0, 0.0, 2.0, 20.0));
    }

    #[test]
    fn test_edges() {
        let sig = signal(session_with(&[0, 1, 1, 0, 1, 0, 0]), 1.0);
        assert_eq!(sig.edges(0, 7), Some((2, 2)));
        assert_eq!(sig.edges(2, 5), Some((1, 1)));
        assert_eq!(sig.edges(5, 5), Some((0, 0)));
        assert_eq!(sig.edges(0, 1000), Some((2, 2)));
    }

    #[test]
    fn test_edges_skip_steady_buckets() {
        let mut bits = vec![0u8; 1000];
        bits.extend(vec![1u8; 1000]);
        bits.extend(vec![0u8; 37]);
        let sig = signal(session_with(&bits), 1.0);
        assert_eq!(sig.edges(0, bits.len() as u64), Some((1, 1)));
        assert_eq!(sig.edges(3, 1500), Some((1, 0)));
    }

    #[test]
    fn test_nearest_edge() {
        let mut bits = vec![0u8; 50];
        bits.extend(vec![1u8; 50]);
        let sig = signal(session_with(&bits), 1.0);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 20.0);
        assert_eq!(sig.nearest_edge(&rect, Point::new(47.0, 10.0), 5.0), Some(50));
        assert_eq!(sig.nearest_edge(&rect, Point::new(20.0, 10.0), 5.0), None);
    }

    #[test]
    fn test_pulse_at() {
        let bits = [0u8, 0, 1, 1, 1, 0, 0, 1, 0];
        let sig = signal(session_with(&bits), 1.0);
        let pulse = sig.pulse_at(3).unwrap();
        assert_eq!(pulse.start, 2);
        assert_eq!(pulse.end, 5);
        assert_eq!(pulse.width(), 3);
        assert_eq!(pulse.next, Some(7));
        assert_eq!(pulse.period(), Some(5));
        // Run touching the oldest sample
        assert!(sig.pulse_at(0).is_none());
    }

    #[test]
    fn test_hit_test_reports_level() {
        let sig = signal(session_with(&[0, 1, 0]), 0.125);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 20.0);
        let hit = sig.hit_test(&rect, Point::new(9.0, 5.0)).unwrap();
        assert_eq!((hit.index, hit.value), (1, 1.0));
        assert_eq!(hit.point.y, 0.0);
        assert!(sig.hit_test(&rect, Point::new(9.0, 30.0)).is_none());
        assert_eq!(sig.measure_at_cursor(2), Some(0.0));
    }

    #[test]
    fn test_idle_is_empty() {
        let session = Arc::new(CaptureSession::with_layout(
            SampleLayout::Logic { channel_count: 8 },
            64,
            RATE,
            EnvelopeConfig::default(),
        ));
        let sig = signal(session, 1.0);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 20.0);
        assert_eq!(sig.draw_primitives(&rect).count(), 0);
        assert_eq!(sig.edges(0, 10), None);
        assert_eq!(sig.measure_at_cursor(0), None);
    }
}
