//! # Playback Core Error Types
//!
//! One error enum per subsystem. Every terminal failure maps onto a
//! [`bridge_traits::ErrorKind`] so it can be surfaced to the host's
//! [`ErrorSink`](bridge_traits::ErrorSink) under a stable category.

use bridge_traits::{BridgeError, ErrorKind};
use core_library::LibraryError;
use thiserror::Error;

// ============================================================================
// Download Errors
// ============================================================================

/// Errors produced by the download scheduler.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The stream resolver could not produce an audio URL.
    #[error("Stream resolution failed: {0}")]
    ResolutionFailed(String),

    /// Fetching the payload failed or timed out.
    #[error("Network transfer failed: {0}")]
    NetworkFailed(String),

    /// Writing the payload to the storage gateway failed.
    #[error("Storage write failed: {0}")]
    StorageFailed(String),

    /// A download for this track is already pending or active.
    #[error("Track is already downloading: {0}")]
    AlreadyDownloading(String),

    /// The track has nothing the resolver can work with.
    #[error("Track has no usable source: {0}")]
    InvalidSource(String),

    /// The download was cancelled.
    #[error("Download cancelled")]
    Cancelled,

    /// Every attempt failed; `last` is the final attempt's failure.
    #[error("Download failed after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        last: Box<DownloadError>,
    },

    /// No track record with this id.
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// Track record persistence failed.
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// The scheduler was shut down.
    #[error("Download scheduler is shut down")]
    SchedulerClosed,
}

impl DownloadError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::ResolutionFailed(_)
                | DownloadError::NetworkFailed(_)
                | DownloadError::StorageFailed(_)
        )
    }

    /// Category reported to the error sink.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::ResolutionFailed(_) => ErrorKind::ResolutionFailed,
            DownloadError::NetworkFailed(_) => ErrorKind::NetworkFailed,
            DownloadError::StorageFailed(_) | DownloadError::Library(_) => ErrorKind::StorageFailed,
            DownloadError::AlreadyDownloading(_) => ErrorKind::AlreadyDownloading,
            DownloadError::InvalidSource(_) | DownloadError::TrackNotFound(_) => {
                ErrorKind::InvalidSource
            }
            DownloadError::Cancelled | DownloadError::SchedulerClosed => ErrorKind::Cancelled,
            DownloadError::MaxRetriesExceeded { .. } => ErrorKind::MaxRetriesExceeded,
        }
    }

    /// Category of the underlying failure, looking through retry exhaustion.
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            DownloadError::MaxRetriesExceeded { last, .. } => last.root_kind(),
            other => other.kind(),
        }
    }

    pub(crate) fn resolution(err: BridgeError) -> Self {
        DownloadError::ResolutionFailed(err.to_string())
    }

    pub(crate) fn network(err: impl std::fmt::Display) -> Self {
        DownloadError::NetworkFailed(err.to_string())
    }

    pub(crate) fn storage(err: BridgeError) -> Self {
        DownloadError::StorageFailed(err.to_string())
    }
}

// ============================================================================
// Queue Errors
// ============================================================================

/// Errors produced by playback queue mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Index {index} out of bounds for queue of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Track already queued: {0}")]
    DuplicateTrack(String),

    #[error("Track not in queue: {0}")]
    TrackNotQueued(String),

    /// Persisted queue state could not be decoded.
    #[error("Corrupt queue state: {0}")]
    Corrupt(String),

    #[error("Queue persistence failed: {0}")]
    Persistence(String),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidQueue
    }
}

// ============================================================================
// Playback Errors
// ============================================================================

/// Errors produced by the playback engine.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Not downloaded and the network policy forbids streaming.
    #[error("Track not downloaded: {0}")]
    TrackNotDownloaded(String),

    /// Marked downloaded but the payload is missing from storage.
    #[error("Audio file not found: {0}")]
    FileNotFound(String),

    /// The payload exists but could not be read or decoded.
    #[error("Failed to load audio file: {0}")]
    FileLoadFailed(String),

    /// The audio output rejected an operation.
    #[error("Audio engine failure: {0}")]
    EngineFailed(String),

    /// Seek rejected, e.g. while the duration is unknown.
    #[error("Seek failed: {0}")]
    SeekFailed(String),

    #[error("Invalid queue operation: {0}")]
    InvalidQueue(#[from] QueueError),

    /// Resolver or network failure while starting a stream.
    #[error("Streaming failed: {0}")]
    StreamingFailed(String),

    /// No track record with this id.
    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),
}

impl PlaybackError {
    /// Category reported to the error sink.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::TrackNotDownloaded(_) => ErrorKind::TrackNotDownloaded,
            PlaybackError::FileNotFound(_) => ErrorKind::FileNotFound,
            PlaybackError::FileLoadFailed(_) => ErrorKind::FileLoadFailed,
            PlaybackError::EngineFailed(_) | PlaybackError::Library(_) => ErrorKind::EngineFailed,
            PlaybackError::SeekFailed(_) => ErrorKind::SeekFailed,
            PlaybackError::InvalidQueue(_) | PlaybackError::UnknownTrack(_) => {
                ErrorKind::InvalidQueue
            }
            PlaybackError::StreamingFailed(_) => ErrorKind::StreamingFailed,
            PlaybackError::Download(e) => e.kind(),
        }
    }

    /// Whether the same request could succeed later (e.g. after reconnecting).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlaybackError::TrackNotDownloaded(_)
                | PlaybackError::StreamingFailed(_)
                | PlaybackError::SeekFailed(_)
        )
    }

    pub(crate) fn engine(err: BridgeError) -> Self {
        PlaybackError::EngineFailed(err.to_string())
    }
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;
pub type QueueResult<T> = std::result::Result<T, QueueError>;
pub type Result<T> = std::result::Result<T, PlaybackError>;
