//! Track repository trait and in-memory implementation

use crate::error::{LibraryError, Result};
use crate::models::{DownloadState, Track, TrackId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Track repository interface
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by its ID
    ///
    /// # Returns
    /// - `Ok(Some(track))` if found
    /// - `Ok(None)` if not found
    async fn find_by_id(&self, id: &TrackId) -> Result<Option<Track>>;

    /// Insert a new track
    ///
    /// # Errors
    /// Returns error if a track with the same ID exists or validation fails
    async fn insert(&self, track: &Track) -> Result<()>;

    /// Replace an existing track
    ///
    /// # Errors
    /// Returns error if the track does not exist or validation fails
    async fn update(&self, track: &Track) -> Result<()>;

    /// Delete a track by ID
    ///
    /// # Returns
    /// `Ok(true)` if deleted, `Ok(false)` if not found
    async fn delete(&self, id: &TrackId) -> Result<bool>;

    /// Tracks currently in the given download state
    async fn find_by_download_state(&self, state: DownloadState) -> Result<Vec<Track>>;

    async fn count(&self) -> Result<usize>;
}

/// `HashMap`-backed repository
#[derive(Debug, Default)]
pub struct InMemoryTrackRepository {
    tracks: RwLock<HashMap<TrackId, Track>>,
}

impl InMemoryTrackRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(track: &Track) -> Result<()> {
        track.validate().map_err(|message| LibraryError::InvalidInput {
            field: "track".to_string(),
            message,
        })
    }
}

#[async_trait]
impl TrackRepository for InMemoryTrackRepository {
    async fn find_by_id(&self, id: &TrackId) -> Result<Option<Track>> {
        Ok(self.tracks.read().get(id).cloned())
    }

    async fn insert(&self, track: &Track) -> Result<()> {
        Self::validate(track)?;
        let mut tracks = self.tracks.write();
        if tracks.contains_key(&track.id) {
            return Err(LibraryError::AlreadyExists {
                entity_type: "Track".to_string(),
                id: track.id.to_string(),
            });
        }
        tracks.insert(track.id, track.clone());
        Ok(())
    }

    async fn update(&self, track: &Track) -> Result<()> {
        Self::validate(track)?;
        let mut tracks = self.tracks.write();
        match tracks.get_mut(&track.id) {
            Some(existing) => {
                *existing = track.clone();
                Ok(())
            }
            None => Err(LibraryError::track_not_found(track.id)),
        }
    }

    async fn delete(&self, id: &TrackId) -> Result<bool> {
        Ok(self.tracks.write().remove(id).is_some())
    }

    async fn find_by_download_state(&self, state: DownloadState) -> Result<Vec<Track>> {
        let mut found: Vec<Track> = self
            .tracks
            .read()
            .values()
            .filter(|t| t.download_state == state)
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        Ok(found)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.tracks.read().len())
    }
}
