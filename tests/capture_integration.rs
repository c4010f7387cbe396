//! Integration tests for the capture worker, spectrum traces and config
//!
//! These tests verify:
//! - Events flowing through the worker thread into the session
//! - Renders running concurrently with appends
//! - Spectrum analysis of a captured channel
//! - Configuration files driving session construction

mod common;

use common::builders::{SessionBuilder, RATE};
use common::{assert_float_eq, sawtooth, test_timeout};
use std::f64::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracevis_rs::config::SpectrumConfig;
use tracevis_rs::{
    AnalogSignal, Band, CaptureEvent, CaptureSession, CaptureState, CaptureWorker, ChannelMeta,
    SampleLayout, SignalAdapter, SpectrumTrace, StaticDeviceConfig, TraceConfig, ViewRect,
    ViewState,
};

// ============================================================================
// Worker
// ============================================================================

#[test]
fn test_worker_full_lifecycle() {
    let session = SessionBuilder::analog().idle().build();
    let worker = CaptureWorker::spawn(session.clone(), 8).unwrap();

    worker.send(CaptureEvent::Samplerate(2_048.0)).unwrap();
    worker.send(CaptureEvent::Start).unwrap();
    for chunk in sawtooth(10_000).chunks(1_000) {
        worker.send(CaptureEvent::Frames(chunk.to_vec())).unwrap();
    }
    worker.send(CaptureEvent::Stop).unwrap();
    let stats = worker.join().unwrap();

    assert_eq!(stats.frames, 10_000);
    assert_eq!(stats.rejected, 0);
    assert_eq!(session.state(), CaptureState::Stopped);
    assert_eq!(session.sample_count(), 10_000);
    assert_eq!(session.samplerate(), 2_048.0);
}

#[test]
fn test_worker_reconfigure_then_clear() {
    let session = SessionBuilder::analog().idle().build();
    let worker = CaptureWorker::spawn(session.clone(), 8).unwrap();

    worker.send(CaptureEvent::Start).unwrap();
    worker.send(CaptureEvent::Frames(vec![1, 2, 3, 4])).unwrap();
    worker
        .send(CaptureEvent::Reconfigure {
            layout: SampleLayout::Analog {
                channel_count: 2,
                unit_bytes: 1,
            },
            capacity: 128,
        })
        .unwrap();
    // Uneven byte count for the two-channel layout
    worker.send(CaptureEvent::Frames(vec![1, 2, 3])).unwrap();
    worker.send(CaptureEvent::Frames(vec![1, 2, 3, 4])).unwrap();
    let stats = worker.join().unwrap();

    assert_eq!(stats.rejected, 1);
    assert_eq!(session.sample_count(), 2);
    assert_eq!(session.snapshot().capacity(), 128);

    session.clear();
    assert_eq!(session.state(), CaptureState::Idle);
    assert!(!session.have_data());
}

#[test]
fn test_render_while_capturing() {
    let session = SessionBuilder::analog().capacity(1 << 14).build();
    let reader = {
        let session = session.clone();
        thread::spawn(move || {
            let signal = AnalogSignal::new(session.clone(), ChannelMeta::default())
                .with_band(Band::new(0.0, 100.0))
                .with_view(ViewState::from_samples_per_pixel(32.0, RATE, 0));
            let rect = ViewRect::new(0.0, 0.0, 200.0, 100.0);
            let deadline = Instant::now() + test_timeout();
            let mut renders = 0;
            while Instant::now() < deadline {
                assert!(signal.draw_primitives(&rect).count() <= 200);
                renders += 1;
                if session.state() == CaptureState::Stopped {
                    break;
                }
            }
            renders
        })
    };

    let worker = CaptureWorker::spawn(session.clone(), 4).unwrap();
    for chunk in sawtooth(50_000).chunks(512) {
        worker.send(CaptureEvent::Frames(chunk.to_vec())).unwrap();
    }
    worker.send(CaptureEvent::Stop).unwrap();
    worker.join().unwrap();

    assert!(reader.join().unwrap() > 0);
    // Ring holds the newest 16384 of 50000 frames
    assert_eq!(session.sample_count(), 1 << 14);
    assert_eq!(session.snapshot().first_absolute(), 50_000 - (1 << 14));
}

// ============================================================================
// Spectrum
// ============================================================================

#[test]
fn test_spectrum_of_captured_tone() {
    let frames: Vec<u8> = (0..4096)
        .map(|i| (128.0 + 100.0 * (2.0 * PI * 100.0 * i as f64 / RATE).sin()).round() as u8)
        .collect();
    let session = SessionBuilder::analog().frames(&frames).stopped().build();
    let meta = ChannelMeta::new(0, 0, 8).with_offsets(128, 128);
    let analog = AnalogSignal::new(session, meta);

    let config = SpectrumConfig {
        length: 1024,
        ..Default::default()
    };
    let mut spectrum = SpectrumTrace::from_device(&analog, &config, &StaticDeviceConfig::default());
    assert!(spectrum.update());

    let (freq, _) = spectrum.result().peak().unwrap();
    assert_float_eq(freq, 100.0, 1e-9);

    let rect = ViewRect::new(0.0, 0.0, 512.0, 200.0);
    let points = spectrum.draw_primitives(&rect).count();
    assert_eq!(points, 511);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_session_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.toml");
    std::fs::write(
        &path,
        r#"
        [capture]
        sample_limit = 256
        samplerate = 1024.0
        layout = { kind = "logic", channel_count = 16 }

        [envelope]
        threshold = 4.0
        "#,
    )
    .unwrap();

    let config = TraceConfig::load(&path).unwrap();
    let session = Arc::new(CaptureSession::new(&config));
    session.start().unwrap();
    assert_eq!(session.append_frames(&[0xff; 600]).unwrap(), 300);
    assert_eq!(session.sample_count(), 256);
    assert_eq!(session.snapshot().envelope().threshold(), 4.0);
    assert_eq!(session.snapshot().layout().frame_bytes(), 2);
}
