//! # Event Bus System
//!
//! Typed, broadcast-based notifications from the download scheduler, the
//! playback engine, the playback queue and library cleanup.
//!
//! ## Overview
//!
//! - **Event Types**: One enum per domain, wrapped by [`CoreEvent`]
//! - **EventBus**: Central `tokio::sync::broadcast` channel for publishing
//! - **EventStream**: Receiver wrapper with predicate filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐  emit   ┌───────────┐
//! │ Download Scheduler ├────────>│           │
//! └────────────────────┘         │           │   subscribe   ┌────────────┐
//! ┌────────────────────┐  emit   │ EventBus  ├──────────────>│ UI binding │
//! │  Playback Engine   ├────────>│ (broadcast│               └────────────┘
//! └────────────────────┘         │  channel) │   subscribe   ┌────────────┐
//! ┌────────────────────┐  emit   │           ├──────────────>│ Telemetry  │
//! │  Library Cleanup   ├────────>│           │               └────────────┘
//! └────────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut rx = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Download(DownloadEvent::Queued {
//!         track_id: "track-1".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(rx.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber fell behind and missed `n` events.
//!   Non-fatal; keep receiving.
//! - **`RecvError::Closed`**: All senders dropped. Treat as shutdown.
//!
//! Emitting with no subscribers returns an error; producers ignore it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Download(DownloadEvent),
    Playback(PlaybackEvent),
    Queue(QueueEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Retrying { .. }) => EventSeverity::Warning,
            CoreEvent::Library(LibraryEvent::CleanupFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::BatchProgress { .. }) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::SourceSwapped { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted by the download scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// Track admitted to the pending queue.
    Queued { track_id: String },
    /// A worker began an attempt.
    Started { track_id: String, attempt: u32 },
    /// Bytes arrived for the active attempt.
    Progress {
        track_id: String,
        /// Fraction in `[0, 1)`.
        fraction: f64,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// An attempt failed and the worker is backing off.
    Retrying {
        track_id: String,
        /// Attempt that just failed.
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    /// Payload stored and track marked downloaded.
    Completed { track_id: String, bytes: u64 },
    /// All attempts exhausted or a non-retryable failure.
    Failed {
        track_id: String,
        attempts: u32,
        reason: String,
    },
    /// Download cancelled while pending or active.
    Cancelled { track_id: String },
    /// Aggregate progress of a bulk re-download.
    BatchProgress {
        completed: usize,
        failed: usize,
        total: usize,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Queued { .. } => "Download queued",
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download progress",
            DownloadEvent::Retrying { .. } => "Download retrying",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
            DownloadEvent::BatchProgress { .. } => "Batch download progress",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events related to audio playback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// Playback started.
    Started {
        track_id: String,
        /// Whether audio comes from a remote stream rather than local storage.
        streaming: bool,
    },
    Paused { track_id: String, position_ms: u64 },
    Resumed { track_id: String, position_ms: u64 },
    Stopped { track_id: Option<String> },
    /// Track finished playing naturally.
    Completed { track_id: String },
    /// Periodic position update while playing.
    PositionChanged {
        track_id: String,
        position_ms: u64,
        duration_ms: Option<u64>,
    },
    /// Active source switched from stream to local payload.
    SourceSwapped { track_id: String, position_ms: u64 },
    /// Playback error occurred.
    Error {
        track_id: Option<String>,
        message: String,
        /// Whether playback can be retried.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Track completed",
            PlaybackEvent::PositionChanged { .. } => "Playback position changed",
            PlaybackEvent::SourceSwapped { .. } => "Switched to local source",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events emitted after playback queue mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    Changed {
        length: usize,
        current_index: Option<usize>,
    },
    ShuffleChanged { enabled: bool },
    /// `mode` is one of "off", "all", "one".
    RepeatModeChanged { mode: String },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Changed { .. } => "Queue changed",
            QueueEvent::ShuffleChanged { .. } => "Shuffle toggled",
            QueueEvent::RepeatModeChanged { .. } => "Repeat mode changed",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to library content removal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// Track record and payload removed.
    TrackDeleted { track_id: String },
    /// Playlist removed after member cleanup.
    PlaylistDeleted {
        playlist_id: String,
        /// Members deleted because no other playlist referenced them.
        removed_tracks: usize,
    },
    /// Best-effort cleanup of a member failed; deletion continued.
    CleanupFailed { track_id: String, message: String },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::TrackDeleted { .. } => "Track removed from library",
            LibraryEvent::PlaylistDeleted { .. } => "Playlist deleted",
            LibraryEvent::CleanupFailed { .. } => "Track cleanup failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Slow subscribers get `RecvError::Lagged` instead of blocking producers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let downloads = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Download(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv). `None` when drained.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
