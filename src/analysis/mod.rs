//! Analysis module for signal processing
//!
//! This module provides the frequency-domain side of the pipeline:
//! - Windowed FFT producing RMS magnitude spectra
//! - Linear / dBV view modes
//! - Peak detection and frequency formatting

pub mod fft;

pub use fft::{format_freq, FftAnalyzer, FftResult, SpectrumViewMode, WindowFunction, DBV_RANGES};
