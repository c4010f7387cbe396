//! FFT (Fast Fourier Transform) analysis module
//!
//! Computes the RMS magnitude spectrum of a block of analog samples:
//! - Windowing with the usual window functions (Hann, Hamming, Blackman, ...)
//! - Coherent-gain correction so a sine reads its true RMS at its bin
//! - Linear and dBV views of the same magnitudes
//! - Peak detection and frequency labels

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};

/// Selectable dBV display ranges
pub const DBV_RANGES: [u32; 4] = [100, 120, 150, 200];

/// Magnitudes below this are floored before conversion to dB
const MAGNITUDE_FLOOR: f64 = 1e-10;

/// Window function type for FFT preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowFunction {
    /// Rectangular window (no windowing)
    #[default]
    Rectangular,
    /// Hann window (good general purpose)
    Hann,
    /// Hamming window (reduced side lobes)
    Hamming,
    /// Blackman window (very low side lobes)
    Blackman,
    /// Flat-top window (accurate amplitude measurement)
    FlatTop,
}

impl WindowFunction {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "Rectangular",
            WindowFunction::Hann => "Hann",
            WindowFunction::Hamming => "Hamming",
            WindowFunction::Blackman => "Blackman",
            WindowFunction::FlatTop => "Flat-Top",
        }
    }

    /// Get all window functions
    pub fn all() -> &'static [WindowFunction] {
        &[
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
            WindowFunction::FlatTop,
        ]
    }

    /// Window coefficient at position i out of n samples
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        let phase = 2.0 * PI * i as f64 / n as f64;

        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - phase.cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
            // Exactly 0 at the endpoints, rounding can dip below
            WindowFunction::Blackman => {
                (0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()).max(0.0)
            }
            WindowFunction::FlatTop => {
                0.21557895 - 0.41663158 * phase.cos() + 0.277263158 * (2.0 * phase).cos()
                    - 0.083578947 * (3.0 * phase).cos()
                    + 0.006947368 * (4.0 * phase).cos()
            }
        }
    }

    /// Window coefficients for n samples
    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

/// How spectrum magnitudes are displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpectrumViewMode {
    /// RMS volts on a linear axis
    #[default]
    LinearRms,
    /// RMS in dB relative to 1 V
    DbvRms,
}

impl SpectrumViewMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            SpectrumViewMode::LinearRms => "Linear RMS",
            SpectrumViewMode::DbvRms => "dBV RMS",
        }
    }

    /// Map a linear RMS magnitude into this view's units
    pub fn apply(&self, magnitude: f64) -> f64 {
        match self {
            SpectrumViewMode::LinearRms => magnitude,
            SpectrumViewMode::DbvRms => 20.0 * magnitude.max(MAGNITUDE_FLOOR).log10(),
        }
    }
}

/// RMS magnitude spectrum of one sample block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FftResult {
    /// RMS magnitude per bin, `length / 2` bins starting at DC
    pub magnitudes: Vec<f64>,
    /// Effective sample rate of the block (after interval decimation)
    pub sample_rate: f64,
    /// Samples the block was computed from
    pub sample_count: usize,
    /// Hz per bin
    pub frequency_resolution: f64,
}

impl FftResult {
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Peak bin above DC as `(frequency, magnitude)`
    pub fn peak(&self) -> Option<(f64, f64)> {
        let (bin, &magnitude) = self
            .magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))?;
        Some((self.frequency_at(bin), magnitude))
    }

    /// Find the top N peaks, at least two bins apart
    pub fn top_peaks(&self, n: usize) -> Vec<(f64, f64)> {
        let mut indexed: Vec<(usize, f64)> =
            self.magnitudes.iter().copied().enumerate().skip(1).collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut peaks: Vec<(usize, f64)> = Vec::new();
        for (bin, mag) in indexed {
            if peaks.len() >= n {
                break;
            }
            if peaks.iter().all(|&(p, _)| p.abs_diff(bin) > 2) {
                peaks.push((bin, mag));
            }
        }
        peaks
            .into_iter()
            .map(|(bin, mag)| (self.frequency_at(bin), mag))
            .collect()
    }

    /// Frequency of `bin` in Hz
    pub fn frequency_at(&self, bin: usize) -> f64 {
        bin as f64 * self.frequency_resolution
    }

    pub fn magnitude_at(&self, bin: usize) -> Option<f64> {
        self.magnitudes.get(bin).copied()
    }

    /// The DC component (0 Hz magnitude)
    pub fn dc_component(&self) -> f64 {
        self.magnitudes.first().copied().unwrap_or(0.0)
    }
}

/// Windowed FFT of fixed length
pub struct FftAnalyzer {
    planner: FftPlanner<f64>,
    length: usize,
    window: WindowFunction,
    coefficients: Vec<f64>,
    coherent_gain: f64,
}

impl std::fmt::Debug for FftAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftAnalyzer")
            .field("length", &self.length)
            .field("window", &self.window)
            .finish()
    }
}

impl FftAnalyzer {
    /// Analyzer over `length` samples (rounded up to a power of two)
    pub fn new(length: usize, window: WindowFunction) -> Self {
        let length = length.max(2).next_power_of_two();
        let coefficients = window.generate(length);
        let coherent_gain = coefficients.iter().sum::<f64>() / length as f64;
        Self {
            planner: FftPlanner::new(),
            length,
            window,
            coefficients,
            coherent_gain: if coherent_gain > 0.0 { coherent_gain } else { 1.0 },
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of bins produced, half the FFT length
    pub fn bins(&self) -> usize {
        self.length / 2
    }

    pub fn window(&self) -> WindowFunction {
        self.window
    }

    /// Change the window, recomputing coefficients
    pub fn set_window(&mut self, window: WindowFunction) {
        if window != self.window {
            *self = Self::new(self.length, window);
        }
    }

    /// RMS magnitude spectrum of `samples` at `sample_rate`
    ///
    /// Uses the newest `length` samples; shorter input is zero-padded.
    pub fn compute(&mut self, samples: &[f64], sample_rate: f64) -> FftResult {
        if samples.is_empty() {
            return FftResult {
                sample_rate,
                ..Default::default()
            };
        }

        let n = self.length;
        let used = &samples[samples.len().saturating_sub(n)..];
        let mut buffer: Vec<Complex<f64>> = used
            .iter()
            .zip(&self.coefficients)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        buffer.resize(n, Complex::new(0.0, 0.0));

        let fft = self.planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let norm = n as f64 * self.coherent_gain;
        let magnitudes: Vec<f64> = buffer
            .iter()
            .take(self.bins())
            .enumerate()
            .map(|(bin, c)| {
                let amplitude = c.norm() / norm;
                // Non-DC bins hold half the energy; report RMS of the full sine
                if bin == 0 {
                    amplitude
                } else {
                    amplitude * 2.0 / SQRT_2
                }
            })
            .collect();

        FftResult {
            magnitudes,
            sample_rate,
            sample_count: used.len(),
            frequency_resolution: sample_rate / n as f64,
        }
    }
}

/// Format a frequency with an SI prefix, e.g. `1.50KHz`
pub fn format_freq(freq: f64, precision: usize) -> String {
    const PREFIXES: [(f64, &str); 4] = [(1e9, "G"), (1e6, "M"), (1e3, "K"), (1.0, "")];

    if freq == 0.0 || !freq.is_finite() {
        return format!("{:.*}Hz", precision, 0.0);
    }
    let magnitude = freq.abs();
    let (div, prefix) = PREFIXES
        .iter()
        .copied()
        .find(|&(div, _)| magnitude >= div)
        .unwrap_or((1.0, ""));
    format!("{:.*}{}Hz", precision, freq / div, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, sample_rate: f64, freq: f64, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_window_functions() {
        let n = 100;
        for window in WindowFunction::all() {
            let coeffs = window.generate(n);
            assert_eq!(coeffs.len(), n);

            // FlatTop has small negative side lobes
            for &c in &coeffs {
                assert!(
                    (-0.1..=1.5).contains(&c),
                    "Window {} coefficient {} out of range",
                    window.display_name(),
                    c
                );
            }
        }
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let sample_rate = 1024.0;
        // Bin-centred tone: bin 64 of a 1024-point FFT
        let samples = sine(1024, sample_rate, 64.0, 1.0);
        let mut analyzer = FftAnalyzer::new(1024, WindowFunction::Hann);
        let result = analyzer.compute(&samples, sample_rate);

        assert_eq!(result.magnitudes.len(), 512);
        let (freq, mag) = result.peak().unwrap();
        assert!((freq - 64.0).abs() < 1e-9);
        // Unit-amplitude sine is 1/sqrt(2) V RMS
        assert!((mag - 1.0 / SQRT_2).abs() < 0.01, "mag = {}", mag);
    }

    #[test]
    fn test_rectangular_dc() {
        let mut analyzer = FftAnalyzer::new(256, WindowFunction::Rectangular);
        let result = analyzer.compute(&[0.5; 256], 1000.0);
        assert!((result.dc_component() - 0.5).abs() < 1e-9);
        assert!(result.magnitudes[1..].iter().all(|&m| m < 1e-9));
    }

    #[test]
    fn test_empty_input() {
        let mut analyzer = FftAnalyzer::new(64, WindowFunction::Hann);
        let result = analyzer.compute(&[], 1000.0);
        assert!(result.is_empty());
        assert!(result.peak().is_none());
    }

    #[test]
    fn test_top_peaks() {
        let sample_rate = 1024.0;
        let samples: Vec<f64> = sine(1024, sample_rate, 50.0, 1.0)
            .into_iter()
            .zip(sine(1024, sample_rate, 200.0, 0.5))
            .map(|(a, b)| a + b)
            .collect();
        let mut analyzer = FftAnalyzer::new(1024, WindowFunction::Blackman);
        let peaks = analyzer.compute(&samples, sample_rate).top_peaks(2);
        assert_eq!(peaks.len(), 2);
        assert!((peaks[0].0 - 50.0).abs() < 1e-9);
        assert!((peaks[1].0 - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_length_rounds_to_power_of_two() {
        assert_eq!(FftAnalyzer::new(1000, WindowFunction::Hann).length(), 1024);
        assert_eq!(FftAnalyzer::new(0, WindowFunction::Hann).bins(), 1);
    }

    #[test]
    fn test_view_mode_dbv() {
        assert!((SpectrumViewMode::DbvRms.apply(1.0)).abs() < 1e-12);
        assert!((SpectrumViewMode::DbvRms.apply(0.1) + 20.0).abs() < 1e-9);
        assert_eq!(SpectrumViewMode::LinearRms.apply(0.25), 0.25);
        assert!((SpectrumViewMode::DbvRms.apply(0.0) + 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_freq() {
        assert_eq!(format_freq(1500.0, 2), "1.50KHz");
        assert_eq!(format_freq(2.5e6, 1), "2.5MHz");
        assert_eq!(format_freq(12.0, 0), "12Hz");
        assert_eq!(format_freq(0.0, 1), "0.0Hz");
        assert_eq!(format_freq(0.5, 1), "0.5Hz");
    }
}
