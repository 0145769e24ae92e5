//! # Core Configuration Module
//!
//! Builder-based configuration for the download and playback core.
//!
//! ## Overview
//!
//! [`CoreConfig`] holds every bridge the core consumes plus the tunables in
//! [`PlaybackPreferences`]. The builder fails fast: a missing bridge is an
//! [`Error::CapabilityMissing`] naming the trait, never a panic later on.
//!
//! ## Required Dependencies
//!
//! - `StreamResolver` - Source reference to audio URL
//! - `AudioOutput` - Device audio scheduling primitive
//!
//! ## Dependencies with desktop defaults
//!
//! - `HttpClient` (reqwest), `StorageGateway` (files under `storage_dir`),
//!   `SettingsStore` (JSON file under `data_dir`), `NetworkMonitor`
//!   (reachability probe), `ErrorSink` (tracing)
//!
//! With the `desktop-shims` feature disabled, these must be injected. The
//! network monitor stays optional; without one the core assumes an
//! unmetered connection.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PlaybackPreferences};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/data")
//!     .stream_resolver(Arc::new(MyResolver))
//!     .audio_output(Arc::new(MyOutput))
//!     .preferences(PlaybackPreferences::default().with_max_concurrent_downloads(4))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    AudioOutput, AudioQuality, ErrorSink, HttpClient, NetworkMonitor, SettingsStore,
    StorageGateway, StreamResolver,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Preferences
// ============================================================================

/// Tunables shared by the download scheduler and playback engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPreferences {
    /// Maximum simultaneous network transfers
    pub max_concurrent_downloads: usize,
    /// Attempts per download before giving up
    pub max_download_attempts: u32,
    /// Backoff before retry `n` is `retry_base_delay * 2^(n-1)`
    pub retry_base_delay: Duration,
    /// Upper bound for a single download attempt
    pub download_timeout: Duration,
    pub default_quality: AudioQuality,
    /// Stream over cellular/metered links
    pub allow_cellular_streaming: bool,
    /// Background downloads over cellular/metered links
    pub allow_cellular_downloads: bool,
    /// Interval of the position update timer
    pub time_update_interval: Duration,
    /// Interval of the end-of-track safety poll
    pub end_of_track_poll_interval: Duration,
    /// Position within this distance of the end counts as finished
    pub end_of_track_epsilon: Duration,
}

impl Default for PlaybackPreferences {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            max_download_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            download_timeout: Duration::from_secs(300),
            default_quality: AudioQuality::Normal,
            allow_cellular_streaming: false,
            allow_cellular_downloads: false,
            time_update_interval: Duration::from_millis(250),
            end_of_track_poll_interval: Duration::from_millis(500),
            end_of_track_epsilon: Duration::from_millis(250),
        }
    }
}

impl PlaybackPreferences {
    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    pub fn with_max_download_attempts(mut self, attempts: u32) -> Self {
        self.max_download_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_default_quality(mut self, quality: AudioQuality) -> Self {
        self.default_quality = quality;
        self
    }

    pub fn with_cellular(mut self, streaming: bool, downloads: bool) -> Self {
        self.allow_cellular_streaming = streaming;
        self.allow_cellular_downloads = downloads;
        self
    }

    pub fn with_time_update_interval(mut self, interval: Duration) -> Self {
        self.time_update_interval = interval;
        self
    }

    pub fn with_end_of_track_poll_interval(mut self, interval: Duration) -> Self {
        self.end_of_track_poll_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 || self.max_concurrent_downloads > 16 {
            return Err(Error::Config(
                "max_concurrent_downloads must be between 1 and 16".to_string(),
            ));
        }

        if self.max_download_attempts == 0 || self.max_download_attempts > 10 {
            return Err(Error::Config(
                "max_download_attempts must be between 1 and 10".to_string(),
            ));
        }

        if self.download_timeout.is_zero() {
            return Err(Error::Config("download_timeout must be non-zero".to_string()));
        }

        if self.time_update_interval.is_zero() || self.end_of_track_poll_interval.is_zero() {
            return Err(Error::Config("Timer intervals must be non-zero".to_string()));
        }

        Ok(())
    }
}

// ============================================================================
// Core Config
// ============================================================================

/// Fully resolved configuration. Construct with [`CoreConfig::builder`].
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for settings and other small state
    pub data_dir: PathBuf,
    /// Directory backing the default storage gateway
    pub storage_dir: PathBuf,
    pub http_client: Arc<dyn HttpClient>,
    pub storage_gateway: Arc<dyn StorageGateway>,
    pub settings_store: Arc<dyn SettingsStore>,
    /// `None` means connectivity is assumed and unmetered
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    pub error_sink: Arc<dyn ErrorSink>,
    pub stream_resolver: Arc<dyn StreamResolver>,
    pub audio_output: Arc<dyn AudioOutput>,
    pub preferences: PlaybackPreferences,
    pub event_buffer_size: usize,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("storage_dir", &self.storage_dir)
            .field(
                "network_monitor",
                &self.network_monitor.as_ref().map(|_| "NetworkMonitor { ... }"),
            )
            .field("preferences", &self.preferences)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(Error::Config("Storage directory cannot be empty".to_string()));
        }
        if self.event_buffer_size == 0 {
            return Err(Error::Config("Event buffer size must be greater than 0".to_string()));
        }
        self.preferences.validate()
    }
}

#[cfg_attr(feature = "desktop-shims", allow(dead_code))]
fn capability_missing(capability: &str, desktop_default: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "No {} implementation provided. \
             Desktop: enable the 'desktop-shims' feature to use {}. \
             Mobile: inject a platform-native adapter.",
            capability, desktop_default
        ),
    }
}

// ============================================================================
// Desktop defaults
// ============================================================================

#[cfg(feature = "desktop-shims")]
mod defaults {
    use super::*;
    use bridge_desktop::{
        DesktopNetworkMonitor, JsonSettingsStore, ReqwestHttpClient, TokioStorageGateway,
        TracingErrorSink,
    };

    pub fn http_client() -> Result<Arc<dyn HttpClient>> {
        Ok(Arc::new(ReqwestHttpClient::new()))
    }

    pub fn storage_gateway(storage_dir: &std::path::Path) -> Result<Arc<dyn StorageGateway>> {
        Ok(Arc::new(TokioStorageGateway::new(storage_dir)))
    }

    pub fn settings_store(data_dir: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
        Ok(Arc::new(JsonSettingsStore::new(data_dir.join("settings.json"))))
    }

    pub fn network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
        Some(Arc::new(DesktopNetworkMonitor::new()))
    }

    pub fn error_sink() -> Result<Arc<dyn ErrorSink>> {
        Ok(Arc::new(TracingErrorSink))
    }
}

#[cfg(not(feature = "desktop-shims"))]
mod defaults {
    use super::*;

    pub fn http_client() -> Result<Arc<dyn HttpClient>> {
        Err(capability_missing("HttpClient", "ReqwestHttpClient"))
    }

    pub fn storage_gateway(_storage_dir: &std::path::Path) -> Result<Arc<dyn StorageGateway>> {
        Err(capability_missing("StorageGateway", "TokioStorageGateway"))
    }

    pub fn settings_store(_data_dir: &std::path::Path) -> Result<Arc<dyn SettingsStore>> {
        Err(capability_missing("SettingsStore", "JsonSettingsStore"))
    }

    pub fn network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
        None
    }

    pub fn error_sink() -> Result<Arc<dyn ErrorSink>> {
        Err(capability_missing("ErrorSink", "TracingErrorSink"))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    storage_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    storage_gateway: Option<Arc<dyn StorageGateway>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    stream_resolver: Option<Arc<dyn StreamResolver>>,
    audio_output: Option<Arc<dyn AudioOutput>>,
    preferences: Option<PlaybackPreferences>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Directory for settings and queue state.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Directory for downloaded payloads. Defaults to `<data_dir>/audio`.
    pub fn storage_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_dir = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn storage_gateway(mut self, gateway: Arc<dyn StorageGateway>) -> Self {
        self.storage_gateway = Some(gateway);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn stream_resolver(mut self, resolver: Arc<dyn StreamResolver>) -> Self {
        self.stream_resolver = Some(resolver);
        self
    }

    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    pub fn preferences(mut self, preferences: PlaybackPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the configuration, filling desktop defaults where available.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when `data_dir` is unset or a value is out of range
    /// - [`Error::CapabilityMissing`] when a required bridge has no default
    pub fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;
        let storage_dir = self.storage_dir.unwrap_or_else(|| data_dir.join("audio"));

        let stream_resolver = self.stream_resolver.ok_or_else(|| Error::CapabilityMissing {
            capability: "StreamResolver".to_string(),
            message: "A StreamResolver is required to turn track source references into \
                      playable URLs. Inject one with .stream_resolver()."
                .to_string(),
        })?;

        let audio_output = self.audio_output.ok_or_else(|| Error::CapabilityMissing {
            capability: "AudioOutput".to_string(),
            message: "An AudioOutput is required to play audio. \
                      Inject the platform audio adapter with .audio_output()."
                .to_string(),
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => defaults::http_client()?,
        };
        let storage_gateway = match self.storage_gateway {
            Some(gateway) => gateway,
            None => defaults::storage_gateway(&storage_dir)?,
        };
        let settings_store = match self.settings_store {
            Some(store) => store,
            None => defaults::settings_store(&data_dir)?,
        };
        let error_sink = match self.error_sink {
            Some(sink) => sink,
            None => defaults::error_sink()?,
        };
        let network_monitor = self.network_monitor.or_else(defaults::network_monitor);

        let config = CoreConfig {
            data_dir,
            storage_dir,
            http_client,
            storage_gateway,
            settings_store,
            network_monitor,
            error_sink,
            stream_resolver,
            audio_output,
            preferences: self.preferences.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}
