//! Error handling for tracevis-rs
//!
//! Every error in the core is recoverable. Render-side callers map errors to
//! "nothing to draw" rather than propagating them; the capture side gets
//! them back from `append` / `reconfigure` so it can log and carry on.

use thiserror::Error;

/// Main error type for tracevis-rs operations
#[derive(Error, Debug)]
pub enum TraceError {
    /// Logical index at or past the current sample count
    #[error("Index {index} out of range (count {count})")]
    OutOfRange { index: u64, count: u64 },

    /// Channel order not present in the current layout
    #[error("Unknown channel order {0}")]
    UnknownChannel(u16),

    /// Pushed frame does not match the configured frame size
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    /// Ring capacity or layout that cannot be allocated
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    /// Capture state machine transition that is not allowed
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        from: &'static str,
        to: &'static str,
    },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication with the capture worker
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TraceError>,
    },
}

impl TraceError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TraceError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for the errors a renderer treats as "nothing to draw"
    pub fn is_benign(&self) -> bool {
        match self {
            TraceError::OutOfRange { .. } | TraceError::UnknownChannel(_) => true,
            TraceError::WithContext { source, .. } => source.is_benign(),
            _ => false,
        }
    }
}

/// Result type alias for tracevis-rs operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
