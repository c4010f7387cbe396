//! Test data builders for creating capture sessions

use std::sync::Arc;
use tracevis_rs::config::EnvelopeConfig;
use tracevis_rs::{CaptureSession, SampleLayout};

/// Samplerate that keeps samples-per-pixel products exact in f64
pub const RATE: f64 = 1_024.0;

/// Builder for creating test capture sessions
pub struct SessionBuilder {
    layout: SampleLayout,
    capacity: u64,
    samplerate: f64,
    envelope: EnvelopeConfig,
    frames: Vec<u8>,
    live: bool,
    stopped: bool,
}

impl SessionBuilder {
    pub fn analog() -> Self {
        Self {
            layout: SampleLayout::default(),
            capacity: 1 << 16,
            samplerate: RATE,
            envelope: EnvelopeConfig::default(),
            frames: Vec::new(),
            live: true,
            stopped: false,
        }
    }

    pub fn logic(channel_count: u16) -> Self {
        Self {
            layout: SampleLayout::Logic { channel_count },
            ..Self::analog()
        }
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn frames(mut self, frames: &[u8]) -> Self {
        self.frames = frames.to_vec();
        self
    }

    /// Leave the session idle
    pub fn idle(mut self) -> Self {
        self.live = false;
        self
    }

    /// Stop the capture after appending
    pub fn stopped(mut self) -> Self {
        self.stopped = true;
        self
    }

    pub fn build(self) -> Arc<CaptureSession> {
        let session = Arc::new(CaptureSession::with_layout(
            self.layout,
            self.capacity,
            self.samplerate,
            self.envelope,
        ));
        if self.live {
            session.start().unwrap();
            session.append_frames(&self.frames).unwrap();
            if self.stopped {
                session.stop().unwrap();
            }
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracevis_rs::CaptureState;

    #[test]
    fn test_session_builder() {
        let session = SessionBuilder::analog().frames(&[1, 2, 3]).stopped().build();
        assert_eq!(session.state(), CaptureState::Stopped);
        assert_eq!(session.sample_count(), 3);
    }
}
