//! Playback queue state and navigation rules
//!
//! [`QueueState`] is plain data: every operation is synchronous and
//! deterministic apart from the shuffle permutation. Persistence and events
//! are layered on top by [`PlaybackQueue`](super::PlaybackQueue).
//!
//! ## Advance
//!
//! | repeat | at last index | effect                         |
//! |--------|---------------|--------------------------------|
//! | off    | no            | index + 1                      |
//! | off    | yes           | unchanged, end of queue        |
//! | all    | no            | index + 1                      |
//! | all    | yes           | index = 0                      |
//! | one    | any           | unchanged, same track replays  |

use crate::error::{QueueError, QueueResult};
use core_library::TrackId;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered track ids plus navigation state.
///
/// Invariants:
/// - `order` holds each id at most once
/// - `current_index` is a valid index into `order`, and `None` iff `order`
///   is empty
/// - with shuffle off, `original_order == order`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    order: Vec<TrackId>,
    original_order: Vec<TrackId>,
    current_index: Option<usize>,
    repeat_mode: RepeatMode,
    shuffle_enabled: bool,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn order(&self) -> &[TrackId] {
        &self.order
    }

    /// Order to restore when shuffle is turned off
    pub fn original_order(&self) -> &[TrackId] {
        &self.original_order
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<TrackId> {
        self.current_index.and_then(|i| self.order.get(i).copied())
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, track_id: &TrackId) -> bool {
        self.order.contains(track_id)
    }

    fn position(&self, track_id: &TrackId) -> Option<usize> {
        self.order.iter().position(|id| id == track_id)
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    /// Replace the queue, starting at `start_at`.
    ///
    /// Duplicate ids keep their first occurrence. With shuffle on, the new
    /// order is shuffled around the starting track.
    pub fn set_queue(&mut self, track_ids: Vec<TrackId>, start_at: usize) -> QueueResult<()> {
        let order = dedup(track_ids);
        if !order.is_empty() && start_at >= order.len() {
            return Err(QueueError::IndexOutOfBounds {
                index: start_at,
                len: order.len(),
            });
        }

        self.current_index = (!order.is_empty()).then_some(start_at);
        self.original_order = order.clone();
        self.order = order;

        if self.shuffle_enabled {
            self.shuffle_around_current();
        }
        Ok(())
    }

    /// Insert right after the current track.
    pub fn insert_next(&mut self, track_id: TrackId) -> QueueResult<()> {
        self.ensure_absent(&track_id)?;

        let at = self.current_index.map_or(0, |i| i + 1);
        let anchor = self.current();
        self.order.insert(at, track_id);

        if self.shuffle_enabled {
            let original_at = anchor
                .and_then(|a| self.original_order.iter().position(|id| *id == a))
                .map_or(self.original_order.len(), |i| i + 1);
            self.original_order.insert(original_at, track_id);
        } else {
            self.original_order = self.order.clone();
        }

        if self.current_index.is_none() {
            self.current_index = Some(0);
        }
        Ok(())
    }

    pub fn append(&mut self, track_id: TrackId) -> QueueResult<()> {
        self.ensure_absent(&track_id)?;

        self.order.push(track_id);
        self.original_order.push(track_id);
        if self.current_index.is_none() {
            self.current_index = Some(0);
        }
        Ok(())
    }

    /// Remove a track. Returns whether it was the current track.
    ///
    /// Removing the current track moves to the track that slid into its
    /// slot; if it was last, wraps to the start under repeat-all and
    /// otherwise falls back to the new last track.
    pub fn remove(&mut self, track_id: &TrackId) -> QueueResult<bool> {
        let removed_at = self
            .position(track_id)
            .ok_or_else(|| QueueError::TrackNotQueued(track_id.to_string()))?;

        self.order.remove(removed_at);
        self.original_order.retain(|id| id != track_id);

        let was_current = self.current_index == Some(removed_at);
        self.current_index = match self.current_index {
            _ if self.order.is_empty() => None,
            Some(current) if removed_at < current => Some(current - 1),
            Some(current) if removed_at == current => {
                if current < self.order.len() {
                    Some(current)
                } else if self.repeat_mode == RepeatMode::All {
                    Some(0)
                } else {
                    Some(self.order.len() - 1)
                }
            }
            other => other,
        };
        Ok(was_current)
    }

    /// Move the track at `from` to `to`; the current track stays current.
    pub fn move_track(&mut self, from: usize, to: usize) -> QueueResult<()> {
        let len = self.order.len();
        for index in [from, to] {
            if index >= len {
                return Err(QueueError::IndexOutOfBounds { index, len });
            }
        }

        let current = self.current();
        let track = self.order.remove(from);
        self.order.insert(to, track);
        self.current_index = current.and_then(|id| self.position(&id));

        if !self.shuffle_enabled {
            self.original_order = self.order.clone();
        }
        Ok(())
    }

    /// Turn shuffle on or off. Returns whether the state changed.
    ///
    /// Enabling keeps the current track at the front of a random permutation
    /// of the rest. Disabling restores the pre-shuffle order and points at
    /// the same track, or at index 0 if that track is gone.
    pub fn set_shuffle(&mut self, enabled: bool) -> bool {
        if self.shuffle_enabled == enabled {
            return false;
        }
        self.shuffle_enabled = enabled;

        if enabled {
            self.original_order = self.order.clone();
            self.shuffle_around_current();
        } else {
            let current = self.current();
            self.order = std::mem::take(&mut self.original_order);
            self.original_order = self.order.clone();
            self.current_index = match current.and_then(|id| self.position(&id)) {
                Some(index) => Some(index),
                None if self.order.is_empty() => None,
                None => Some(0),
            };
        }
        true
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    /// Make `index` current.
    pub fn jump_to(&mut self, index: usize) -> QueueResult<TrackId> {
        let track_id = *self.order.get(index).ok_or(QueueError::IndexOutOfBounds {
            index,
            len: self.order.len(),
        })?;
        self.current_index = Some(index);
        Ok(track_id)
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Step forward per the repeat table; `None` signals end of queue.
    pub fn advance(&mut self) -> Option<TrackId> {
        let len = self.order.len();
        let current = self.current_index?;

        let next = match self.repeat_mode {
            RepeatMode::One => current,
            _ if current + 1 < len => current + 1,
            RepeatMode::All => 0,
            RepeatMode::Off => return None,
        };
        self.current_index = Some(next);
        self.order.get(next).copied()
    }

    /// Step back one, clamped at 0 unless repeat-all wraps to the end.
    pub fn previous(&mut self) -> Option<TrackId> {
        let len = self.order.len();
        let current = self.current_index?;

        let prev = match (current, self.repeat_mode) {
            (0, RepeatMode::All) => len - 1,
            (0, _) => 0,
            (i, _) => i - 1,
        };
        self.current_index = Some(prev);
        self.order.get(prev).copied()
    }

    // ------------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------------

    /// Repair a state loaded from storage so the invariants hold.
    pub fn validated(mut self) -> Self {
        self.order = dedup(std::mem::take(&mut self.order));

        if self.shuffle_enabled {
            let live: HashSet<TrackId> = self.order.iter().copied().collect();
            let mut original = dedup(std::mem::take(&mut self.original_order));
            original.retain(|id| live.contains(id));
            for id in &self.order {
                if !original.contains(id) {
                    original.push(*id);
                }
            }
            self.original_order = original;
        } else {
            self.original_order = self.order.clone();
        }

        self.current_index = match self.current_index {
            _ if self.order.is_empty() => None,
            Some(i) if i < self.order.len() => Some(i),
            _ => Some(0),
        };
        self
    }

    fn ensure_absent(&self, track_id: &TrackId) -> QueueResult<()> {
        if self.contains(track_id) {
            return Err(QueueError::DuplicateTrack(track_id.to_string()));
        }
        Ok(())
    }

    fn shuffle_around_current(&mut self) {
        let current = self.current();
        let mut rest: Vec<TrackId> = self
            .order
            .iter()
            .copied()
            .filter(|id| Some(*id) != current)
            .collect();
        rest.shuffle(&mut rand::rng());

        self.order = current.into_iter().chain(rest).collect();
        self.current_index = (!self.order.is_empty()).then_some(0);
    }
}

fn dedup(track_ids: Vec<TrackId>) -> Vec<TrackId> {
    let mut seen = HashSet::with_capacity(track_ids.len());
    track_ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
