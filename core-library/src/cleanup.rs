//! # Refcount-Aware Library Cleanup
//!
//! A track's stored payload is deleted only once no playlist references it.
//!
//! ## Deleting a playlist
//!
//! ```text
//! for each member:
//!     remove association (decrement)      ──┐
//!     no playlist left? ── yes ──> purge  ──┤  failures logged, collected
//!                        no ──> retain   ──┘
//! delete playlist record                      (always, after member cleanup)
//! ```
//!
//! Purging a track cancels any in-flight download first and waits for the
//! worker to unwind, so nothing writes to a key after it was deleted.

use crate::error::{LibraryError, Result};
use crate::models::{PlaylistId, TrackId};
use crate::repositories::{PlaylistRepository, TrackRepository};
use async_trait::async_trait;
use bridge_traits::StorageGateway;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Implemented by the download scheduler.
#[async_trait]
pub trait ActiveDownloadGuard: Send + Sync {
    /// Cancel any pending or active download of `track_id` and return once
    /// no worker can still write its payload. A no-op for unknown tracks.
    async fn cancel_and_wait(&self, track_id: &TrackId);
}

/// Outcome of a playlist deletion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Members purged because nothing else referenced them
    pub deleted_tracks: Vec<TrackId>,
    /// Members still referenced by another playlist
    pub retained_tracks: Vec<TrackId>,
    /// Members whose cleanup failed, with the failure message
    pub failures: Vec<(TrackId, String)>,
}

pub struct LibraryCleanup {
    tracks: Arc<dyn TrackRepository>,
    playlists: Arc<dyn PlaylistRepository>,
    storage: Arc<dyn StorageGateway>,
    downloads: Option<Arc<dyn ActiveDownloadGuard>>,
    event_bus: Option<EventBus>,
}

impl LibraryCleanup {
    pub fn new(
        tracks: Arc<dyn TrackRepository>,
        playlists: Arc<dyn PlaylistRepository>,
        storage: Arc<dyn StorageGateway>,
    ) -> Self {
        Self {
            tracks,
            playlists,
            storage,
            downloads: None,
            event_bus: None,
        }
    }

    pub fn with_download_guard(mut self, guard: Arc<dyn ActiveDownloadGuard>) -> Self {
        self.downloads = Some(guard);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Library(event));
        }
    }

    /// Delete a playlist, purging members that end up unreferenced.
    ///
    /// Member cleanup is best-effort: failures are logged and reported, and
    /// the playlist record is deleted regardless.
    ///
    /// # Errors
    /// - [`LibraryError::NotFound`] if the playlist does not exist
    /// - repository errors when deleting the playlist record itself
    #[instrument(skip(self), fields(playlist_id = %playlist_id))]
    pub async fn delete_playlist(&self, playlist_id: &PlaylistId) -> Result<CleanupReport> {
        let playlist = self
            .playlists
            .find_by_id(playlist_id)
            .await?
            .ok_or_else(|| LibraryError::playlist_not_found(playlist_id))?;

        let mut report = CleanupReport::default();

        for track_id in &playlist.track_ids {
            match self.release_member(playlist_id, track_id).await {
                Ok(true) => report.deleted_tracks.push(*track_id),
                Ok(false) => report.retained_tracks.push(*track_id),
                Err(e) => {
                    warn!(track_id = %track_id, error = %e, "Track cleanup failed, continuing");
                    self.emit(LibraryEvent::CleanupFailed {
                        track_id: track_id.to_string(),
                        message: e.to_string(),
                    });
                    report.failures.push((*track_id, e.to_string()));
                }
            }
        }

        self.playlists.delete(playlist_id).await?;

        info!(
            deleted = report.deleted_tracks.len(),
            retained = report.retained_tracks.len(),
            failed = report.failures.len(),
            "Playlist deleted"
        );
        self.emit(LibraryEvent::PlaylistDeleted {
            playlist_id: playlist_id.to_string(),
            removed_tracks: report.deleted_tracks.len(),
        });

        Ok(report)
    }

    /// Drop one membership; purge the track if it was the last reference.
    ///
    /// Returns whether the track was purged.
    async fn release_member(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> Result<bool> {
        self.playlists.remove_track(playlist_id, track_id).await?;

        let remaining = self.playlists.playlists_containing(track_id).await?;
        if !remaining.is_empty() {
            debug!(track_id = %track_id, references = remaining.len(), "Track still referenced");
            return Ok(false);
        }

        self.purge_track(track_id).await?;
        Ok(true)
    }

    /// Delete a track outright, detaching it from every playlist first.
    #[instrument(skip(self), fields(track_id = %track_id))]
    pub async fn delete_track(&self, track_id: &TrackId) -> Result<()> {
        for playlist_id in self.playlists.playlists_containing(track_id).await? {
            self.playlists.remove_track(&playlist_id, track_id).await?;
        }
        self.purge_track(track_id).await
    }

    async fn purge_track(&self, track_id: &TrackId) -> Result<()> {
        if let Some(guard) = &self.downloads {
            guard.cancel_and_wait(track_id).await;
        }

        let Some(track) = self.tracks.find_by_id(track_id).await? else {
            debug!(track_id = %track_id, "Track record already gone");
            return Ok(());
        };

        let key = track
            .local_key
            .clone()
            .unwrap_or_else(|| track_id.storage_key());
        self.storage.delete(&key).await?;
        self.tracks.delete(track_id).await?;

        info!(track_id = %track_id, "Track purged");
        self.emit(LibraryEvent::TrackDeleted {
            track_id: track_id.to_string(),
        });
        Ok(())
    }
}
