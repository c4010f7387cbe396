//! TraceVis demo - Main Entry Point
//!
//! Streams a synthetic capture through the worker thread, then renders the
//! analog, logic and spectrum traces once and logs what each produced.
//!
//! Usage: `tracevis [config.toml]`

use anyhow::Context;
use std::f64::consts::PI;
use std::sync::Arc;
use tracevis_rs::{
    config::TraceConfig, signal::format_time, types::MAX_UNIT_BYTES, AnalogSignal, Band,
    CaptureEvent, CaptureSession, CaptureWorker, CursorSet, DrawPath, LogicSignal, SampleLayout,
    SignalAdapter, SpectrumTrace, ViewRect, ViewState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Frames pushed per worker event
const CHUNK_FRAMES: usize = 4096;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tracevis_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TraceVis demo");

    let mut config = match std::env::args().nth(1) {
        Some(path) => TraceConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => TraceConfig::default(),
    };
    if config.capture.layout.is_logic() {
        tracing::warn!("Demo drives an analog capture, replacing the logic layout");
        config.capture.layout = SampleLayout::default();
    }
    tracing::debug!("Configuration:\n{}", config.to_json()?);

    let analog_session = Arc::new(CaptureSession::new(&config));
    let logic_session = Arc::new(CaptureSession::with_layout(
        SampleLayout::Logic { channel_count: 8 },
        config.capture.sample_limit,
        config.capture.samplerate,
        config.envelope,
    ));

    capture(&analog_session, analog_frames(&config))?;
    capture(&logic_session, logic_frames(&config))?;

    let width = config.render.view_width;
    let height = config.render.trace_height;
    let view = ViewState::from_samples_per_pixel(
        config.render.samples_per_pixel,
        config.capture.samplerate,
        0,
    );
    let rect = ViewRect::new(0.0, 0.0, width, height);

    let analog = AnalogSignal::from_device(analog_session.clone(), 0, 0, &config.device)
        .with_band(Band::new(0.0, height))
        .with_view(view);
    report("analog", &analog, &rect);

    // Zoomed far out, the same channel comes from the envelope index
    let overview = ViewState::from_samples_per_pixel(
        analog_session.sample_count() as f64 / width,
        config.capture.samplerate,
        0,
    );
    let mut zoomed = AnalogSignal::from_device(analog_session.clone(), 0, 0, &config.device)
        .with_band(Band::new(0.0, height));
    zoomed.set_view(overview);
    report("analog overview", &zoomed, &rect);

    for order in 0..2 {
        let logic = LogicSignal::new(logic_session.clone(), order, order)
            .with_band(Band::new(0.0, 20.0))
            .with_view(overview);
        report("logic", &logic, &ViewRect::new(0.0, 0.0, width, 20.0));
        if let Some((rising, falling)) = logic.edges(0, logic_session.sample_count()) {
            tracing::info!(channel = order, rising, falling, "edge count");
        }
    }

    let mut spectrum = SpectrumTrace::from_device(&analog, &config.spectrum, &config.device);
    if spectrum.update() {
        if let Some((freq, magnitude)) = spectrum.result().peak() {
            tracing::info!("Spectrum peak {:.1} Hz at {:.4}", freq, magnitude);
        }
    }
    report("spectrum", &spectrum, &rect);

    let mut cursors = CursorSet::new();
    let a = cursors.add(1000);
    let b = cursors.add(3500);
    if let Some(delta) = cursors.delta(a, b) {
        tracing::info!(
            "Cursor delta {}",
            format_time(delta as f64 / config.capture.samplerate, 2)
        );
    }

    tracing::info!("Shutting down...");
    Ok(())
}

/// Run one capture through a worker thread and stop it
fn capture(session: &Arc<CaptureSession>, frames: Vec<u8>) -> anyhow::Result<()> {
    let frame_bytes = session.snapshot().layout().frame_bytes();
    let worker = CaptureWorker::spawn(session.clone(), 16)?;
    worker.send(CaptureEvent::Start)?;
    for chunk in frames.chunks(CHUNK_FRAMES * frame_bytes) {
        worker.send(CaptureEvent::Frames(chunk.to_vec()))?;
    }
    worker.send(CaptureEvent::Stop)?;
    let stats = worker.join()?;
    tracing::info!(
        events = stats.events,
        frames = stats.frames,
        rejected = stats.rejected,
        "capture finished"
    );
    Ok(())
}

fn report(name: &str, signal: &dyn SignalAdapter, rect: &ViewRect) {
    let primitives = signal.draw_primitives(rect);
    let path = primitives.path();
    let count = primitives.count();
    if path == DrawPath::Empty {
        tracing::warn!("{}: nothing to draw", name);
    } else {
        tracing::info!("{}: {} primitives via {:?}", name, count, path);
    }
}

/// A 1 kHz sine on every analog channel, one sample limit long
fn analog_frames(config: &TraceConfig) -> Vec<u8> {
    let layout = config.capture.layout;
    let channels = layout.channel_count() as usize;
    // A loaded config is validated, so this only guards the slice below
    let unit_bytes = layout.unit_bytes().min(MAX_UNIT_BYTES) as usize;
    let full_scale = ((1u64 << (8 * unit_bytes).min(32)) - 1) as f64;
    let mut bytes = Vec::with_capacity(config.capture.sample_limit as usize * layout.frame_bytes());
    for i in 0..config.capture.sample_limit {
        let phase = 2.0 * PI * 1_000.0 * i as f64 / config.capture.samplerate;
        let value = (full_scale / 2.0 * (1.0 + 0.8 * phase.sin())).round() as u64;
        for _ in 0..channels {
            bytes.extend_from_slice(&value.to_le_bytes()[..unit_bytes]);
        }
    }
    bytes
}

/// A binary counter, so logic channel `n` toggles every `2^(n+4)` samples
fn logic_frames(config: &TraceConfig) -> Vec<u8> {
    (0..config.capture.sample_limit).map(|i| (i >> 4) as u8).collect()
}
