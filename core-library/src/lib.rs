//! # Track Library
//!
//! Track and playlist records consumed by the download and playback core,
//! plus the refcount rule that decides when a track's payload may be
//! deleted.
//!
//! - [`models`] - `Track`, `Playlist`, `DownloadState` and id types
//! - [`repositories`] - Load/save/query contracts with in-memory implementations
//! - [`cleanup`] - Refcount-aware deletion of playlists and tracks

pub mod cleanup;
pub mod error;
pub mod models;
pub mod repositories;

pub use cleanup::{ActiveDownloadGuard, CleanupReport, LibraryCleanup};
pub use error::{LibraryError, Result};
pub use models::{AudioQuality, DownloadState, Playlist, PlaylistId, Track, TrackId};
pub use repositories::{
    InMemoryPlaylistRepository, InMemoryTrackRepository, PlaylistRepository, TrackRepository,
};
