//! Domain models for the track library
//!
//! Tracks carry their own download state. The download scheduler is the only
//! writer of the download fields, and every transition goes through the
//! `mark_*` methods below so the state/progress/key invariants hold.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use bridge_traits::AudioQuality;

/// Largest progress value reported while a download is still in flight.
///
/// `1.0` is reserved for the downloaded state.
pub const MAX_IN_FLIGHT_PROGRESS: f64 = 0.99;

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Storage key of this track's downloaded payload.
    ///
    /// One key per track, so concurrent workers never share a key.
    pub fn storage_key(&self) -> String {
        format!("tracks/{}.audio", self.0)
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistId(pub Uuid);

impl PlaylistId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PlaylistId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Download State
// =============================================================================

/// Persistent download state of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    NotDownloaded,
    Queued,
    Downloading,
    Downloaded,
    Failed,
}

impl DownloadState {
    /// Queued or downloading
    pub fn is_in_progress(&self) -> bool {
        matches!(self, DownloadState::Queued | DownloadState::Downloading)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::NotDownloaded => "not_downloaded",
            DownloadState::Queued => "queued",
            DownloadState::Downloading => "downloading",
            DownloadState::Downloaded => "downloaded",
            DownloadState::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// One playable audio item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    /// Opaque reference handed to the stream resolver
    pub source_ref: Option<String>,
    pub title: String,
    pub artist: Option<String>,
    pub duration_seconds: Option<f64>,

    // Download
    pub download_state: DownloadState,
    /// Storage gateway key, present iff downloaded
    pub local_key: Option<String>,
    pub file_size_bytes: Option<u64>,
    /// Fraction in `[0, 1]`; `1.0` iff downloaded
    pub download_progress: f64,
    /// Quality of the stored payload
    pub quality: Option<AudioQuality>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Track {
    pub fn new(title: impl Into<String>, source_ref: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: TrackId::new(),
            source_ref,
            title: title.into(),
            artist: None,
            duration_seconds: None,
            download_state: DownloadState::NotDownloaded,
            local_key: None,
            file_size_bytes: None,
            download_progress: 0.0,
            quality: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration_seconds(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn is_downloaded(&self) -> bool {
        self.download_state == DownloadState::Downloaded
    }

    /// Check the download invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }

        if !(0.0..=1.0).contains(&self.download_progress) {
            return Err(format!(
                "Download progress {} is outside [0, 1]",
                self.download_progress
            ));
        }

        if (self.download_progress >= 1.0) != self.is_downloaded() {
            return Err("Progress 1.0 must coincide with the downloaded state".to_string());
        }

        if self.local_key.is_some() && !self.is_downloaded() {
            return Err("Local key present on a track that is not downloaded".to_string());
        }

        if self.is_downloaded() && self.local_key.is_none() {
            return Err("Downloaded track has no local key".to_string());
        }

        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }

    pub fn mark_queued(&mut self) {
        self.download_state = DownloadState::Queued;
        self.download_progress = 0.0;
        self.local_key = None;
        self.touch();
    }

    pub fn mark_downloading(&mut self) {
        self.download_state = DownloadState::Downloading;
        self.local_key = None;
        self.download_progress = 0.0;
        self.touch();
    }

    /// Record in-flight progress, capped below `1.0`.
    pub fn set_progress(&mut self, fraction: f64) {
        if self.is_downloaded() {
            return;
        }
        self.download_progress = fraction.clamp(0.0, MAX_IN_FLIGHT_PROGRESS);
    }

    pub fn mark_downloaded(&mut self, local_key: String, size_bytes: u64, quality: AudioQuality) {
        self.download_state = DownloadState::Downloaded;
        self.local_key = Some(local_key);
        self.file_size_bytes = Some(size_bytes);
        self.download_progress = 1.0;
        self.quality = Some(quality);
        self.touch();
    }

    pub fn mark_failed(&mut self) {
        self.download_state = DownloadState::Failed;
        self.local_key = None;
        self.download_progress = 0.0;
        self.touch();
    }

    /// Back to `NotDownloaded`, forgetting any stored payload.
    pub fn reset_download(&mut self) {
        self.download_state = DownloadState::NotDownloaded;
        self.local_key = None;
        self.file_size_bytes = None;
        self.download_progress = 0.0;
        self.quality = None;
        self.touch();
    }
}

/// Ordered collection of tracks; the container for refcount deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub track_ids: Vec<TrackId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Playlist {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: PlaylistId::new(),
            name: name.into(),
            track_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tracks(mut self, track_ids: impl IntoIterator<Item = TrackId>) -> Self {
        for id in track_ids {
            if !self.track_ids.contains(&id) {
                self.track_ids.push(id);
            }
        }
        self
    }

    pub fn contains(&self, track_id: &TrackId) -> bool {
        self.track_ids.contains(track_id)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Playlist name cannot be empty".to_string());
        }
        Ok(())
    }
}
