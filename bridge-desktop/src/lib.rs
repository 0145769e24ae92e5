//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides implementations of the bridge traits the download
//! and playback core needs, using desktop-appropriate libraries:
//! - `StorageGateway` using `tokio::fs`, one file per key
//! - `HttpClient` using `reqwest` byte streams
//! - `SettingsStore` using a JSON file in the data directory
//! - `NetworkMonitor` using a TCP reachability probe
//! - `ErrorSink` forwarding to `tracing`
//!
//! `AudioOutput` and `StreamResolver` have no desktop default: audio device
//! scheduling and source resolution are host concerns.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioStorageGateway};
//! use bridge_traits::{HttpClient, StorageGateway};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let storage = TokioStorageGateway::in_data_dir();
//!
//!     // Use in core configuration
//! }
//! ```

mod error_sink;
mod filesystem;
mod http;
mod network;
mod settings;

pub use error_sink::TracingErrorSink;
pub use filesystem::TokioStorageGateway;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
pub use settings::JsonSettingsStore;
