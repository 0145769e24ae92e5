//! # Downloads & Playback
//!
//! The offline-first half of the core: background downloads of track
//! payloads, the playback queue, and the engine that decides between a
//! stored payload and a remote stream.
//!
//! ## Overview
//!
//! - [`download`] - Bounded-concurrency scheduler with retry, progress and cancellation
//! - [`queue`] - Ordered track ids with shuffle, repeat and persistence
//! - [`engine`] - Playback state machine with stream-to-local source swap
//! - [`policy`] - Network policy deciding whether streaming or downloading is allowed
//!
//! ## Wiring
//!
//! ```text
//!            ┌────────────────┐ submit  ┌───────────────────┐
//!  UI ──────>│ PlaybackEngine ├────────>│ DownloadScheduler │
//!            └──┬──────────┬──┘         └─────────┬─────────┘
//!               │ owns     │ drives               │ resolve / fetch / store
//!        ┌──────▼───────┐ ┌▼────────────┐  ┌──────▼────────────────────┐
//!        │ PlaybackQueue│ │ AudioOutput │  │ StreamResolver            │
//!        └──────────────┘ └─────────────┘  │ HttpClient, StorageGateway│
//!                                          └───────────────────────────┘
//! ```
//!
//! Every collaborator outside this crate is a `bridge_traits` trait object
//! injected by the host.

pub mod download;
pub mod engine;
pub mod error;
pub mod policy;
pub mod queue;

pub use download::{
    BatchSummary, CancelOutcome, DownloadConfig, DownloadOutcome, DownloadProgress,
    DownloadRequest, DownloadScheduler, DownloadTicket, EnqueueOutcome, SchedulerStats, TaskPhase,
};
pub use engine::{EngineConfig, EngineContext, EngineSnapshot, PlaybackEngine, PlaybackPhase};
pub use error::{
    DownloadError, DownloadResult, PlaybackError, QueueError, QueueResult, Result,
};
pub use policy::NetworkPolicy;
pub use queue::{
    MemoryQueueStore, PlaybackQueue, QueueState, QueueStore, RepeatMode, SettingsQueueStore,
    DEFAULT_QUEUE_KEY,
};
