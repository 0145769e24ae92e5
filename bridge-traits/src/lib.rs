//! # Host Bridge Traits
//!
//! Contracts for every collaborator the download and playback core consumes
//! but does not implement itself.
//!
//! ## Overview
//!
//! The core never touches the filesystem, the network, or the audio device
//! directly. Each of those capabilities is expressed as a trait here and
//! injected by the host (see `bridge-desktop` for the desktop adapters, or
//! hand-written stubs in tests).
//!
//! ## Traits
//!
//! ### Payloads & Resolution
//! - [`StorageGateway`](storage::StorageGateway) - Binary audio payloads by key
//! - [`StreamResolver`](resolver::StreamResolver) - Source reference to time-limited audio URL
//! - [`HttpClient`](http::HttpClient) - Streaming byte fetch of a resolved URL
//!
//! ### Device & Environment
//! - [`AudioOutput`](audio::AudioOutput) - Audio scheduling primitive with completion callbacks
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and metered network detection
//! - [`SettingsStore`](storage::SettingsStore) - Key-value persistence (queue state, preferences)
//!
//! ### Reporting
//! - [`ErrorSink`](error_sink::ErrorSink) - Terminal, categorized errors surfaced to the host
//! - [`LoggerSink`](logger::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! let resolver = config.stream_resolver
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "StreamResolver".to_string(),
//!         message: "No stream resolver provided.".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! as `Arc<dyn Trait>` across download workers and the playback engine.

pub mod audio;
pub mod error;
pub mod error_sink;
pub mod http;
pub mod logger;
pub mod network;
pub mod resolver;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use audio::{AudioOutput, AudioSource, CompletionNotifier};
pub use error_sink::{ErrorContext, ErrorKind, ErrorSink, NoopErrorSink};
pub use http::{DownloadStream, HttpClient};
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use resolver::{AudioQuality, ResolvedStream, StreamResolver};
pub use storage::{SettingsStore, StorageGateway};
