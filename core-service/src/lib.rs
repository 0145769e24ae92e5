//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] and the host's track/playlist
//! repositories into a ready-to-use [`CoreService`]:
//!
//! ```text
//!   CoreConfig ──┐
//!   Tracks ──────┼──> CoreService::bootstrap ──> scheduler + engine + cleanup
//!   Playlists ───┘        │
//!                         ├─ follow the network monitor
//!                         ├─ restore the saved playback queue
//!                         └─ resume downloads a previous session left behind
//! ```
//!
//! Desktop hosts typically enable the `desktop-shims` feature so that HTTP,
//! storage, settings, network and error reporting fall back to the
//! `bridge-desktop` implementations.
//!
//! ```ignore
//! use core_service::{CoreConfig, CoreService};
//! use core_library::{InMemoryPlaylistRepository, InMemoryTrackRepository};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/data")
//!     .stream_resolver(Arc::new(MyResolver))
//!     .audio_output(Arc::new(MyOutput))
//!     .build()?;
//!
//! let core = CoreService::bootstrap(
//!     config,
//!     Arc::new(InMemoryTrackRepository::new()),
//!     Arc::new(InMemoryPlaylistRepository::new()),
//! )
//! .await?;
//! core.engine().play(track_id).await?;
//! ```

pub mod error;

pub use core_runtime::config::{CoreConfig, PlaybackPreferences};
pub use error::{CoreError, Result};

use core_library::{
    CleanupReport, LibraryCleanup, PlaylistId, PlaylistRepository, TrackId, TrackRepository,
};
use core_playback::{
    DownloadConfig, DownloadScheduler, EngineConfig, EngineContext, NetworkPolicy, PlaybackEngine,
    PlaybackQueue, SettingsQueueStore,
};
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Primary façade exposed to host applications.
///
/// Cheap to clone; clones share the same scheduler, engine and event bus.
#[derive(Clone)]
pub struct CoreService {
    scheduler: DownloadScheduler,
    engine: PlaybackEngine,
    cleanup: Arc<LibraryCleanup>,
    policy: NetworkPolicy,
    event_bus: EventBus,
}

impl CoreService {
    /// Build every core component from `config`.
    ///
    /// Startup is best-effort where the previous session is concerned: a
    /// network monitor that cannot be read leaves the policy at its
    /// unrestricted default, and an unreadable saved queue starts empty.
    ///
    /// # Errors
    /// - [`CoreError::InitializationFailed`] if derived scheduler or engine
    ///   settings are out of range
    /// - [`CoreError::Download`] if interrupted downloads cannot be queried
    #[instrument(skip_all)]
    pub async fn bootstrap(
        config: CoreConfig,
        tracks: Arc<dyn TrackRepository>,
        playlists: Arc<dyn PlaylistRepository>,
    ) -> Result<Self> {
        config.validate()?;
        let prefs = &config.preferences;

        let download_config = DownloadConfig::from_preferences(prefs);
        download_config
            .validate()
            .map_err(CoreError::InitializationFailed)?;
        let engine_config = EngineConfig::from_preferences(prefs);
        engine_config
            .validate()
            .map_err(CoreError::InitializationFailed)?;

        let event_bus = EventBus::new(config.event_buffer_size);

        let policy = NetworkPolicy::from_preferences(prefs);
        if let Some(monitor) = &config.network_monitor {
            if let Err(e) = policy.watch(Arc::clone(monitor)).await {
                warn!(error = %e, "Network monitor unavailable, assuming unrestricted connection");
            }
        }

        let scheduler = DownloadScheduler::new(
            download_config,
            Arc::clone(&tracks),
            Arc::clone(&config.stream_resolver),
            Arc::clone(&config.http_client),
            Arc::clone(&config.storage_gateway),
            Arc::clone(&config.error_sink),
            event_bus.clone(),
        );

        let cleanup = LibraryCleanup::new(
            Arc::clone(&tracks),
            playlists,
            Arc::clone(&config.storage_gateway),
        )
        .with_download_guard(Arc::new(scheduler.clone()))
        .with_event_bus(event_bus.clone());

        let queue_store = Arc::new(SettingsQueueStore::new(Arc::clone(&config.settings_store)));
        let queue = PlaybackQueue::restore(queue_store)
            .await
            .with_event_bus(event_bus.clone());

        let engine = PlaybackEngine::new(
            engine_config,
            EngineContext {
                tracks,
                storage: Arc::clone(&config.storage_gateway),
                resolver: Arc::clone(&config.stream_resolver),
                output: Arc::clone(&config.audio_output),
                scheduler: scheduler.clone(),
                policy: policy.clone(),
                error_sink: Arc::clone(&config.error_sink),
                event_bus: event_bus.clone(),
            },
            queue,
        );

        let resumed = scheduler.resume_interrupted().await?;
        info!(resumed, "Core service ready");

        Ok(Self {
            scheduler,
            engine,
            cleanup: Arc::new(cleanup),
            policy,
            event_bus,
        })
    }

    pub fn scheduler(&self) -> &DownloadScheduler {
        &self.scheduler
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn cleanup(&self) -> &LibraryCleanup {
        &self.cleanup
    }

    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Delete a playlist and purge members no other playlist references.
    pub async fn delete_playlist(&self, playlist_id: &PlaylistId) -> Result<CleanupReport> {
        Ok(self.cleanup.delete_playlist(playlist_id).await?)
    }

    /// Delete a track and its stored payload, cancelling any download.
    pub async fn delete_track(&self, track_id: &TrackId) -> Result<()> {
        Ok(self.cleanup.delete_track(track_id).await?)
    }

    /// Stop playback and cancel outstanding downloads.
    ///
    /// Pending downloads keep their `queued` state and resume on the next
    /// [`bootstrap`](Self::bootstrap).
    pub async fn shutdown(&self) {
        if let Err(e) = self.engine.stop().await {
            warn!(error = %e, "Failed to stop playback during shutdown");
        }
        self.scheduler.shutdown();
        info!("Core service shut down");
    }
}
