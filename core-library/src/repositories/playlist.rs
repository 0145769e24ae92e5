//! Playlist repository trait and in-memory implementation

use crate::error::{LibraryError, Result};
use crate::models::{Playlist, PlaylistId, TrackId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Playlist repository interface
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    async fn find_by_id(&self, id: &PlaylistId) -> Result<Option<Playlist>>;

    /// Insert a new playlist
    async fn insert(&self, playlist: &Playlist) -> Result<()>;

    /// Delete a playlist by ID
    ///
    /// # Returns
    /// `Ok(true)` if deleted, `Ok(false)` if not found
    async fn delete(&self, id: &PlaylistId) -> Result<bool>;

    /// Add a track to the end of a playlist. Adding a member twice is a no-op.
    async fn add_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> Result<()>;

    /// Remove a track from a playlist
    ///
    /// # Returns
    /// `Ok(true)` if the track was a member
    async fn remove_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> Result<bool>;

    /// Playlists that contain `track_id`
    async fn playlists_containing(&self, track_id: &TrackId) -> Result<Vec<PlaylistId>>;
}

/// `HashMap`-backed repository
#[derive(Debug, Default)]
pub struct InMemoryPlaylistRepository {
    playlists: RwLock<HashMap<PlaylistId, Playlist>>,
}

impl InMemoryPlaylistRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaylistRepository for InMemoryPlaylistRepository {
    async fn find_by_id(&self, id: &PlaylistId) -> Result<Option<Playlist>> {
        Ok(self.playlists.read().get(id).cloned())
    }

    async fn insert(&self, playlist: &Playlist) -> Result<()> {
        playlist
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "playlist".to_string(),
                message,
            })?;

        let mut playlists = self.playlists.write();
        if playlists.contains_key(&playlist.id) {
            return Err(LibraryError::AlreadyExists {
                entity_type: "Playlist".to_string(),
                id: playlist.id.to_string(),
            });
        }
        playlists.insert(playlist.id, playlist.clone());
        Ok(())
    }

    async fn delete(&self, id: &PlaylistId) -> Result<bool> {
        Ok(self.playlists.write().remove(id).is_some())
    }

    async fn add_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> Result<()> {
        let mut playlists = self.playlists.write();
        let playlist = playlists
            .get_mut(playlist_id)
            .ok_or_else(|| LibraryError::playlist_not_found(playlist_id))?;
        if !playlist.contains(track_id) {
            playlist.track_ids.push(*track_id);
            playlist.updated_at = chrono::Utc::now().timestamp();
        }
        Ok(())
    }

    async fn remove_track(&self, playlist_id: &PlaylistId, track_id: &TrackId) -> Result<bool> {
        let mut playlists = self.playlists.write();
        let playlist = playlists
            .get_mut(playlist_id)
            .ok_or_else(|| LibraryError::playlist_not_found(playlist_id))?;
        let before = playlist.track_ids.len();
        playlist.track_ids.retain(|id| id != track_id);
        Ok(playlist.track_ids.len() != before)
    }

    async fn playlists_containing(&self, track_id: &TrackId) -> Result<Vec<PlaylistId>> {
        Ok(self
            .playlists
            .read()
            .values()
            .filter(|p| p.contains(track_id))
            .map(|p| p.id)
            .collect())
    }
}
