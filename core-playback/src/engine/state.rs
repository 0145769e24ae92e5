//! Observable engine state

use core_library::TrackId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle of the audible session.
///
/// ```text
/// idle ─> resolving_or_loading ─> playing <─> paused
///                                    │  ▲
///                                    ▼  │
///                          transitioning_sourceswap
///
/// any ─> stopped   (explicit stop, end of queue, unrecoverable error)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    #[default]
    Idle,
    ResolvingOrLoading,
    Playing,
    Paused,
    TransitioningSourceswap,
    Stopped,
}

impl PlaybackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackPhase::Idle => "idle",
            PlaybackPhase::ResolvingOrLoading => "resolving_or_loading",
            PlaybackPhase::Playing => "playing",
            PlaybackPhase::Paused => "paused",
            PlaybackPhase::TransitioningSourceswap => "transitioning_sourceswap",
            PlaybackPhase::Stopped => "stopped",
        }
    }

    /// A source is loaded and audible or resumable.
    pub fn has_source(&self) -> bool {
        matches!(
            self,
            PlaybackPhase::Playing | PlaybackPhase::Paused | PlaybackPhase::TransitioningSourceswap
        )
    }
}

impl fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the engine, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub phase: PlaybackPhase,
    /// Always `Some` while playing
    pub current_track_id: Option<TrackId>,
    pub current_time: Duration,
    /// `None` until the source or the track metadata reports it
    pub duration: Option<Duration>,
    pub is_streaming_source: bool,
}

impl EngineSnapshot {
    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_idle() {
        let snapshot = EngineSnapshot::default();
        assert_eq!(snapshot.phase, PlaybackPhase::Idle);
        assert!(snapshot.current_track_id.is_none());
        assert!(!snapshot.is_playing());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(
            PlaybackPhase::TransitioningSourceswap.to_string(),
            "transitioning_sourceswap"
        );
        assert!(PlaybackPhase::Paused.has_source());
        assert!(!PlaybackPhase::Stopped.has_source());
    }
}
