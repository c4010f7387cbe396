//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Sawtooth over the full 8-bit range
pub fn sawtooth(count: usize) -> Vec<u8> {
    (0..=255u8).cycle().take(count).collect()
}

/// Square wave toggling between 0 and 255 every `half_period` samples
pub fn square(count: usize, half_period: usize) -> Vec<u8> {
    (0..count)
        .map(|i| if (i / half_period) % 2 == 0 { 0 } else { 255 })
        .collect()
}
