//! # Repository Contracts
//!
//! Track and playlist persistence is an external collaborator; the core
//! only needs load/save/query. The in-memory implementations back tests and
//! hosts that keep their catalog elsewhere and mirror it in.

pub mod playlist;
pub mod track;

pub use playlist::{InMemoryPlaylistRepository, PlaylistRepository};
pub use track::{InMemoryTrackRepository, TrackRepository};
