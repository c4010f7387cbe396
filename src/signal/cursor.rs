//! Time cursors
//!
//! Cursors mark logical sample indices. They stay put while the view zooms
//! or pans; [`Cursor::index_to_pixel`] places them in the current view.

use crate::mapper::CoordinateMapper;
use serde::{Deserialize, Serialize};

/// A time marker at a logical sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: u32,
    pub index: u64,
}

impl Cursor {
    pub fn new(id: u32, index: u64) -> Self {
        Self { id, index }
    }

    /// Horizontal position of the cursor relative to the view's left edge
    pub fn index_to_pixel(&self, mapper: &CoordinateMapper) -> f64 {
        mapper.sample_to_pixel(self.index as f64)
    }

    /// Whether the cursor label falls inside a `width`-pixel view
    pub fn is_visible(&self, mapper: &CoordinateMapper, width: f64) -> bool {
        let x = self.index_to_pixel(mapper);
        (0.0..=width).contains(&x)
    }

    /// Time of the cursor from the start of the capture
    pub fn time_secs(&self, samplerate: f64) -> f64 {
        if samplerate > 0.0 {
            self.index as f64 / samplerate
        } else {
            0.0
        }
    }
}

/// Cursors of one view, kept sorted by index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CursorSet {
    cursors: Vec<Cursor>,
    next_id: u32,
}

impl CursorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cursor at `index`, returning its id
    pub fn add(&mut self, index: u64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.cursors.push(Cursor::new(id, index));
        self.sort_by_index();
        id
    }

    pub fn remove(&mut self, id: u32) -> bool {
        match self.cursors.iter().position(|c| c.id == id) {
            Some(pos) => {
                self.cursors.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u32) -> Option<&Cursor> {
        self.cursors.iter().find(|c| c.id == id)
    }

    /// Move cursor `id` to `index`
    pub fn set_index(&mut self, id: u32, index: u64) -> bool {
        let Some(cursor) = self.cursors.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        cursor.index = index;
        self.sort_by_index();
        true
    }

    /// All cursors in index order
    pub fn sorted(&self) -> &[Cursor] {
        &self.cursors
    }

    /// Cursors whose labels fall inside the view
    pub fn visible<'a>(
        &'a self,
        mapper: &'a CoordinateMapper,
        width: f64,
    ) -> impl Iterator<Item = &'a Cursor> {
        self.cursors
            .iter()
            .filter(move |c| c.is_visible(mapper, width))
    }

    /// Cursor drawn closest to pixel `x`, within `radius` pixels
    pub fn nearest(&self, mapper: &CoordinateMapper, x: f64, radius: f64) -> Option<&Cursor> {
        self.cursors
            .iter()
            .map(|c| (c, (c.index_to_pixel(mapper) - x).abs()))
            .filter(|&(_, d)| d <= radius)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(c, _)| c)
    }

    /// Samples between cursors `a` and `b`
    pub fn delta(&self, a: u32, b: u32) -> Option<u64> {
        Some(self.get(a)?.index.abs_diff(self.get(b)?.index))
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn clear(&mut self) {
        self.cursors.clear();
    }

    fn sort_by_index(&mut self) {
        self.cursors.sort_by_key(|c| c.index);
    }
}

/// Format a time in seconds with an SI prefix, e.g. `1.50ms`
pub fn format_time(seconds: f64, precision: usize) -> String {
    const PREFIXES: [(f64, &str); 5] = [(1.0, ""), (1e-3, "m"), (1e-6, "u"), (1e-9, "n"), (1e-12, "p")];

    if seconds == 0.0 || !seconds.is_finite() {
        return format!("{:.*}s", precision, 0.0);
    }
    let magnitude = seconds.abs();
    let (div, prefix) = PREFIXES
        .iter()
        .copied()
        .find(|&(div, _)| magnitude >= div)
        .unwrap_or((1e-12, "p"));
    format!("{:.*}{}s", precision, seconds / div, prefix)
}
