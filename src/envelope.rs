//! Envelope / decimation index
//!
//! A per-channel hierarchy of `(min, max)` summaries. Level `k` buckets span
//! `base_scale * scale_factor^k` raw samples; bucket `b` of a level covers
//! absolute samples `[b * scale, (b + 1) * scale)`, where absolute indices
//! count every sample appended since the ring was allocated.
//!
//! Appending a sample folds it into the level-0 running bucket. When a
//! bucket completes it is pushed onto its level and folded into the running
//! bucket of the level above. Each level only retains enough buckets to
//! cover the ring's live window, so memory stays proportional to capacity.
//!
//! Rendering a view of `N` samples across `W` pixels touches roughly
//! `N / scale` buckets instead of `N` samples once samples-per-pixel crosses
//! the configured threshold.

use crate::config::EnvelopeConfig;
use std::collections::VecDeque;

/// One `(min, max)` summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeSample {
    pub min: u64,
    pub max: u64,
}

impl EnvelopeSample {
    fn single(value: u64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Summary covering both `self` and `other`
    pub fn merge(self, other: EnvelopeSample) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// True when the bucket covers more than one distinct value
    pub fn has_transition(&self) -> bool {
        self.min != self.max
    }
}

/// Partially filled bucket
#[derive(Debug, Clone, Copy)]
struct Running {
    sample: EnvelopeSample,
    /// Raw samples folded in so far
    filled: u64,
}

#[derive(Debug, Clone)]
struct EnvelopeLevel {
    scale: u64,
    buckets: VecDeque<EnvelopeSample>,
    /// Absolute bucket index of `buckets[0]`
    first_bucket: u64,
    retain: usize,
    running: Option<Running>,
}

impl EnvelopeLevel {
    fn new(scale: u64, capacity: u64) -> Self {
        let retain = capacity.div_ceil(scale).saturating_add(1);
        Self {
            scale,
            buckets: VecDeque::new(),
            first_bucket: 0,
            retain: usize::try_from(retain).unwrap_or(usize::MAX),
            running: None,
        }
    }

    /// Absolute index of the bucket currently being filled
    fn next_bucket(&self) -> u64 {
        self.first_bucket + self.buckets.len() as u64
    }

    /// Fold a summary of `weight` raw samples; returns the bucket if it completed
    fn fold(&mut self, sample: EnvelopeSample, weight: u64) -> Option<EnvelopeSample> {
        let running = match self.running.take() {
            Some(r) => Running {
                sample: r.sample.merge(sample),
                filled: r.filled + weight,
            },
            None => Running {
                sample,
                filled: weight,
            },
        };

        if running.filled < self.scale {
            self.running = Some(running);
            return None;
        }

        self.buckets.push_back(running.sample);
        if self.buckets.len() > self.retain {
            self.buckets.pop_front();
            self.first_bucket += 1;
        }
        Some(running.sample)
    }
}

#[derive(Debug, Clone)]
struct ChannelEnvelope {
    levels: Vec<EnvelopeLevel>,
    samples: u64,
}

impl ChannelEnvelope {
    fn new(scales: &[u64], capacity: u64) -> Self {
        Self {
            levels: scales
                .iter()
                .map(|&s| EnvelopeLevel::new(s, capacity))
                .collect(),
            samples: 0,
        }
    }

    fn update(&mut self, value: u64) {
        self.samples += 1;
        let mut carry = EnvelopeSample::single(value);
        let mut weight = 1;
        for level in &mut self.levels {
            match level.fold(carry, weight) {
                Some(done) => {
                    weight = level.scale;
                    carry = done;
                }
                None => break,
            }
        }
    }

    /// Merge of every running bucket up to and including `level`
    ///
    /// That is the trailing, partially filled bucket of `level`, built from
    /// all samples seen so far.
    fn trailing(&self, level: usize) -> Option<EnvelopeSample> {
        self.levels[..=level]
            .iter()
            .filter_map(|l| l.running.map(|r| r.sample))
            .reduce(EnvelopeSample::merge)
    }

    fn bucket(&self, level: usize, bucket: u64) -> Option<EnvelopeSample> {
        let lvl = self.levels.get(level)?;
        if bucket < lvl.first_bucket {
            return None;
        }
        let next = lvl.next_bucket();
        if bucket < next {
            return lvl.buckets.get((bucket - lvl.first_bucket) as usize).copied();
        }
        if bucket == next {
            return self.trailing(level);
        }
        None
    }

    /// One past the last bucket with any data at `level`
    fn end_bucket(&self, level: usize) -> u64 {
        let next = self.levels[level].next_bucket();
        if self.trailing(level).is_some() {
            next + 1
        } else {
            next
        }
    }
}

/// Bucket range of a query, addressable through [`EnvelopeIndex::bucket`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionBounds {
    pub level: usize,
    pub scale: u64,
    /// First absolute bucket index
    pub start: u64,
    /// One past the last absolute bucket index
    pub end: u64,
}

impl SectionBounds {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Materialised result of [`EnvelopeIndex::query`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeSection {
    /// Raw samples per bucket (0 for an empty section)
    pub scale: u64,
    /// Absolute index of the first bucket
    pub start_bucket: u64,
    pub samples: Vec<EnvelopeSample>,
}

impl EnvelopeSection {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Envelope hierarchy for every active channel of a capture
#[derive(Debug, Clone)]
pub struct EnvelopeIndex {
    threshold: f64,
    scales: Vec<u64>,
    capacity: u64,
    channels: Vec<Option<ChannelEnvelope>>,
}

impl EnvelopeIndex {
    /// Build an empty index for a ring of `capacity` samples
    pub fn new(config: &EnvelopeConfig, capacity: u64) -> Self {
        Self {
            threshold: config.threshold,
            scales: Self::level_scales(config, capacity),
            capacity,
            channels: Vec::new(),
        }
    }

    /// Bucket scale of every level, finest first
    ///
    /// Always at least one level; no level is wider than the ring.
    pub fn level_scales(config: &EnvelopeConfig, capacity: u64) -> Vec<u64> {
        let base = config.base_scale.max(2);
        let factor = config.scale_factor.max(2);
        let mut scales = vec![base];
        let mut scale = base;
        while scales.len() < config.max_levels.max(1) {
            match scale.checked_mul(factor) {
                Some(next) if next <= capacity => {
                    scales.push(next);
                    scale = next;
                }
                _ => break,
            }
        }
        scales
    }

    /// Start summarising channel `order`
    pub fn activate(&mut self, order: u16) {
        let idx = order as usize;
        if self.channels.len() <= idx {
            self.channels.resize_with(idx + 1, || None);
        }
        if self.channels[idx].is_none() {
            self.channels[idx] = Some(ChannelEnvelope::new(&self.scales, self.capacity));
        }
    }

    pub fn is_active(&self, order: u16) -> bool {
        self.channel(order).is_some()
    }

    /// Fold one raw sample of `order`; ignored for inactive channels
    pub fn update(&mut self, value: u64, order: u16) -> bool {
        match self
            .channels
            .get_mut(order as usize)
            .and_then(|c| c.as_mut())
        {
            Some(channel) => {
                channel.update(value);
                true
            }
            None => false,
        }
    }

    /// Drop every bucket, keeping the set of active channels
    pub fn clear(&mut self) {
        for slot in &mut self.channels {
            if slot.is_some() {
                *slot = Some(ChannelEnvelope::new(&self.scales, self.capacity));
            }
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scales(&self) -> &[u64] {
        &self.scales
    }

    /// Raw samples summarised for `order`
    pub fn sample_count(&self, order: u16) -> u64 {
        self.channel(order).map_or(0, |c| c.samples)
    }

    /// Coarsest level whose scale is at most `samples_per_pixel / threshold`,
    /// level 0 when none qualifies
    pub fn select_level(&self, samples_per_pixel: f64) -> usize {
        let target = samples_per_pixel / self.threshold;
        self.scales
            .iter()
            .rposition(|&s| s as f64 <= target)
            .unwrap_or(0)
    }

    /// Bucket bounds covering absolute samples `[start, start + length)`
    pub fn section(&self, start: u64, length: u64, level: usize, order: u16) -> Option<SectionBounds> {
        let channel = self.channel(order)?;
        let lvl = channel.levels.get(level)?;
        let scale = lvl.scale;
        let end_sample = start.saturating_add(length);

        let first = (start / scale).max(lvl.first_bucket);
        let end = end_sample.div_ceil(scale).min(channel.end_bucket(level));
        Some(SectionBounds {
            level,
            scale,
            start: first,
            end: end.max(first),
        })
    }

    /// Bucket `bucket` of `level`, including the trailing partial bucket
    pub fn bucket(&self, order: u16, level: usize, bucket: u64) -> Option<EnvelopeSample> {
        self.channel(order)?.bucket(level, bucket)
    }

    /// `(min, max)` buckets covering absolute samples `[start, start + length)`
    ///
    /// Unknown channels yield an empty section.
    pub fn query(&self, start: u64, length: u64, samples_per_pixel: f64, order: u16) -> EnvelopeSection {
        let level = self.select_level(samples_per_pixel);
        let Some(bounds) = self.section(start, length, level, order) else {
            tracing::trace!(order, "envelope query for inactive channel");
            return EnvelopeSection::default();
        };

        let samples: Vec<EnvelopeSample> = (bounds.start..bounds.end)
            .filter_map(|b| self.bucket(order, level, b))
            .collect();
        EnvelopeSection {
            scale: bounds.scale,
            start_bucket: bounds.start,
            samples,
        }
    }

    fn channel(&self, order: u16) -> Option<&ChannelEnvelope> {
        self.channels.get(order as usize).and_then(|c| c.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> EnvelopeConfig {
        EnvelopeConfig {
            threshold: 16.0,
            base_scale: 4,
            scale_factor: 4,
            max_levels: 4,
        }
    }

    fn filled(values: &[u64], capacity: u64) -> EnvelopeIndex {
        let mut index = EnvelopeIndex::new(&config(), capacity);
        index.activate(0);
        for &v in values {
            index.update(v, 0);
        }
        index
    }

    #[test]
    fn test_level_scales_bounded_by_capacity() {
        assert_eq!(EnvelopeIndex::level_scales(&config(), 1000), vec![4, 16, 64, 256]);
        assert_eq!(EnvelopeIndex::level_scales(&config(), 20), vec![4, 16]);
        assert_eq!(EnvelopeIndex::level_scales(&config(), 1), vec![4]);
    }

    #[test]
    fn test_select_level() {
        let index = EnvelopeIndex::new(&config(), 1 << 20);
        assert_eq!(index.select_level(1.0), 0);
        assert_eq!(index.select_level(20.0), 0);
        assert_eq!(index.select_level(16.0 * 16.0), 1);
        assert_eq!(index.select_level(16.0 * 100.0), 2);
        assert_eq!(index.select_level(1e12), 3);
    }

    #[test]
    fn test_unknown_channel_is_empty() {
        let index = filled(&[1, 2, 3], 64);
        let section = index.query(0, 3, 20.0, 5);
        assert!(section.is_empty());
        assert_eq!(section.scale, 0);
    }

    #[test]
    fn test_inactive_update_ignored() {
        let mut index = EnvelopeIndex::new(&config(), 64);
        assert!(!index.update(7, 0));
        assert_eq!(index.sample_count(0), 0);
    }

    #[test]
    fn test_complete_and_trailing_buckets() {
        let index = filled(&[5, 1, 9, 3, 4, 2], 64);
        let section = index.query(0, 6, 20.0, 0);
        assert_eq!(section.scale, 4);
        assert_eq!(
            section.samples,
            vec![
                EnvelopeSample { min: 1, max: 9 },
                EnvelopeSample { min: 2, max: 4 },
            ]
        );
    }

    #[test]
    fn test_cascade_into_next_level() {
        let values: Vec<u64> = (0..40).collect();
        let index = filled(&values, 1024);
        // 40 samples: two complete 16-buckets, trailing bucket holds 32..40
        let bounds = index.section(0, 40, 1, 0).unwrap();
        assert_eq!((bounds.start, bounds.end), (0, 3));
        assert_eq!(index.bucket(0, 1, 0), Some(EnvelopeSample { min: 0, max: 15 }));
        assert_eq!(index.bucket(0, 1, 1), Some(EnvelopeSample { min: 16, max: 31 }));
        assert_eq!(index.bucket(0, 1, 2), Some(EnvelopeSample { min: 32, max: 39 }));
        assert_eq!(index.bucket(0, 1, 3), None);
    }

    #[test]
    fn test_old_buckets_are_clipped() {
        let values: Vec<u64> = (0..100).collect();
        let index = filled(&values, 8);
        let section = index.query(0, 100, 20.0, 0);
        // 8-sample ring at scale 4 retains three buckets: 88..100
        assert_eq!(section.start_bucket, 22);
        assert_eq!(section.samples.len(), 3);
        assert_eq!(section.samples[0], EnvelopeSample { min: 88, max: 91 });
    }

    #[test]
    fn test_clear_keeps_activation() {
        let mut index = filled(&[1, 2, 3, 4, 5], 64);
        index.clear();
        assert!(index.is_active(0));
        assert!(index.query(0, 5, 20.0, 0).is_empty());
    }

    proptest! {
        #[test]
        fn test_buckets_bound_their_samples(
            values in prop::collection::vec(0u64..1000, 1..600),
            level in 0usize..3,
        ) {
            let index = filled(&values, 4096);
            let bounds = index.section(0, values.len() as u64, level, 0).unwrap();
            for b in bounds.start..bounds.end {
                let bucket = index.bucket(0, level, b).unwrap();
                let lo = (b * bounds.scale) as usize;
                let hi = (((b + 1) * bounds.scale) as usize).min(values.len());
                for &v in &values[lo..hi] {
                    prop_assert!(bucket.min <= v && v <= bucket.max);
                }
                let exact_min = values[lo..hi].iter().min().copied().unwrap();
                let exact_max = values[lo..hi].iter().max().copied().unwrap();
                prop_assert_eq!(bucket, EnvelopeSample { min: exact_min, max: exact_max });
            }
        }
    }
}
