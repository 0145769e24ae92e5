//! Error Reporting
//!
//! Terminal, categorized failures are surfaced to the host through an
//! [`ErrorSink`]. Intermediate retry failures are never reported here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a terminal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Download
    ResolutionFailed,
    NetworkFailed,
    StorageFailed,
    AlreadyDownloading,
    InvalidSource,
    Cancelled,
    MaxRetriesExceeded,

    // Playback
    TrackNotDownloaded,
    FileNotFound,
    FileLoadFailed,
    EngineFailed,
    SeekFailed,
    InvalidQueue,
    StreamingFailed,
}

impl ErrorKind {
    /// Whether this kind belongs to the download taxonomy
    pub fn is_download(&self) -> bool {
        matches!(
            self,
            ErrorKind::ResolutionFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::StorageFailed
                | ErrorKind::AlreadyDownloading
                | ErrorKind::InvalidSource
                | ErrorKind::Cancelled
                | ErrorKind::MaxRetriesExceeded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ResolutionFailed => "resolution_failed",
            ErrorKind::NetworkFailed => "network_failed",
            ErrorKind::StorageFailed => "storage_failed",
            ErrorKind::AlreadyDownloading => "already_downloading",
            ErrorKind::InvalidSource => "invalid_source",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::MaxRetriesExceeded => "max_retries_exceeded",
            ErrorKind::TrackNotDownloaded => "track_not_downloaded",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::FileLoadFailed => "file_load_failed",
            ErrorKind::EngineFailed => "engine_failed",
            ErrorKind::SeekFailed => "seek_failed",
            ErrorKind::InvalidQueue => "invalid_queue",
            ErrorKind::StreamingFailed => "streaming_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to a reported error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub track_id: Option<String>,
    /// Attempts made before giving up (download errors)
    pub attempts: Option<u32>,
    /// Category of the last underlying failure, for aggregate kinds
    pub cause: Option<ErrorKind>,
    pub message: String,
}

impl ErrorContext {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_track(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_cause(mut self, cause: ErrorKind) -> Self {
        self.cause = Some(cause);
        self
    }
}

/// Error sink trait
///
/// Receives each terminal failure exactly once. Implementations must not
/// block; forward to a UI channel, a telemetry pipeline, or a log.
pub trait ErrorSink: Send + Sync {
    fn report(&self, kind: ErrorKind, context: ErrorContext);
}

/// Sink that drops every report
#[derive(Debug, Clone, Default)]
pub struct NoopErrorSink;

impl ErrorSink for NoopErrorSink {
    fn report(&self, _kind: ErrorKind, _context: ErrorContext) {}
}
