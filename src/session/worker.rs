//! Capture worker thread
//!
//! Feeds a [`CaptureSession`] from a bounded crossbeam channel so producers
//! (a device driver callback, a file replay, a test) never touch the session
//! lock themselves. Events are applied in order; a failing event is logged
//! and counted, and the loop carries on.

use super::CaptureSession;
use crate::error::{Result, TraceError};
use crate::types::SampleLayout;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Events accepted by the capture worker
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Begin a capture
    Start,
    /// Whole frames of raw sample data
    Frames(Vec<u8>),
    /// New samplerate in Hz
    Samplerate(f64),
    /// New frame layout or ring capacity
    Reconfigure { layout: SampleLayout, capacity: u64 },
    /// Freeze the capture
    Stop,
    /// Drop captured data
    Clear,
    /// Exit the worker loop
    Shutdown,
}

/// Counters reported when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Events received, including rejected ones
    pub events: u64,
    /// Frames stored in the ring
    pub frames: u64,
    /// Events that failed to apply
    pub rejected: u64,
}

/// Handle to a running capture worker
pub struct CaptureWorker {
    sender: Sender<CaptureEvent>,
    handle: JoinHandle<WorkerStats>,
}

impl CaptureWorker {
    /// Spawn a worker applying events to `session`
    ///
    /// `queue_depth` bounds the channel; producers block when it is full.
    pub fn spawn(session: Arc<CaptureSession>, queue_depth: usize) -> Result<Self> {
        let (sender, receiver) = bounded(queue_depth.max(1));
        let handle = std::thread::Builder::new()
            .name("tracevis-capture".to_string())
            .spawn(move || run(&session, &receiver))?;
        Ok(Self { sender, handle })
    }

    /// A sender for producers on other threads
    pub fn sender(&self) -> Sender<CaptureEvent> {
        self.sender.clone()
    }

    /// Queue one event
    pub fn send(&self, event: CaptureEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|e| TraceError::Channel(format!("capture worker stopped: {}", e)))
    }

    /// Shut the worker down and wait for it to drain its queue
    pub fn join(self) -> Result<WorkerStats> {
        // Events queued before shutdown are still applied
        let _ = self.sender.send(CaptureEvent::Shutdown);
        self.handle
            .join()
            .map_err(|_| TraceError::Channel("capture worker panicked".to_string()))
    }
}

fn run(session: &CaptureSession, receiver: &Receiver<CaptureEvent>) -> WorkerStats {
    tracing::info!("Capture worker started");
    let mut stats = WorkerStats::default();

    // Also exits once every sender is dropped
    while let Ok(event) = receiver.recv() {
        if event == CaptureEvent::Shutdown {
            break;
        }
        stats.events += 1;
        match apply(session, event) {
            Ok(frames) => stats.frames += frames as u64,
            Err(e) => {
                stats.rejected += 1;
                tracing::warn!("Capture event rejected: {}", e);
            }
        }
    }

    tracing::info!(
        events = stats.events,
        frames = stats.frames,
        rejected = stats.rejected,
        "Capture worker stopped"
    );
    stats
}

fn apply(session: &CaptureSession, event: CaptureEvent) -> Result<usize> {
    match event {
        CaptureEvent::Start => session.start().map(|_| 0),
        CaptureEvent::Frames(bytes) => session.append_frames(&bytes),
        CaptureEvent::Samplerate(rate) => {
            session.set_samplerate(rate);
            Ok(0)
        }
        CaptureEvent::Reconfigure { layout, capacity } => {
            session.reconfigure(layout, capacity).map(|_| 0)
        }
        CaptureEvent::Stop => session.stop().map(|_| 0),
        CaptureEvent::Clear => {
            session.clear();
            Ok(0)
        }
        CaptureEvent::Shutdown => Ok(0),
    }
}
