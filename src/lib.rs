//! # TraceVis-RS: Waveform Capture and Render Pipeline
//!
//! The data side of a logic analyzer / oscilloscope viewer. Captured frames
//! stream into a fixed-capacity ring, a multi-level min/max envelope index
//! summarises them as they arrive, and per-channel signal adapters turn the
//! current view into a bounded number of draw primitives no matter how many
//! samples are stored.
//!
//! ## Architecture
//!
//! - **Store**: Fixed-capacity ring of interleaved frames that overwrites the oldest
//! - **Envelope**: Min/max buckets at increasing scales, updated incrementally
//! - **Session**: Ring and envelope behind one lock, with the capture state machine
//! - **Worker**: Capture thread draining events from a crossbeam channel
//! - **Mapper**: Sample ↔ pixel and raw value ↔ pixel transforms
//! - **Signal**: Analog, logic and spectrum adapters producing draw primitives
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracevis_rs::{
//!     AnalogSignal, CaptureSession, ChannelMeta, SignalAdapter, TraceConfig, ViewRect,
//! };
//!
//! let config = TraceConfig::default();
//! let session = Arc::new(CaptureSession::new(&config));
//! session.start()?;
//! session.append_frames(&bytes)?;
//!
//! let analog = AnalogSignal::new(session.clone(), ChannelMeta::default());
//! for primitive in analog.draw_primitives(&ViewRect::new(0.0, 0.0, 1000.0, 100.0)) {
//!     // hand to the renderer
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod device;
pub mod envelope;
pub mod error;
pub mod mapper;
pub mod session;
pub mod signal;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::TraceConfig;
pub use device::{DeviceConfig, StaticDeviceConfig};
pub use envelope::{EnvelopeIndex, EnvelopeSample};
pub use error::{Result, TraceError};
pub use mapper::{CoordinateMapper, SampleWindow};
pub use session::{CaptureEvent, CaptureSession, CaptureWorker};
pub use signal::{
    AnalogSignal, Cursor, CursorSet, DrawPath, DrawPrimitives, Hit, LogicSignal, Primitive,
    Signal, SignalAdapter, SignalKind, SpectrumTrace,
};
pub use store::RingBuffer;
pub use types::{Band, CaptureState, ChannelMeta, SampleLayout, ViewRect, ViewState};
