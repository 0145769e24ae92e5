//! # Playback Queue
//!
//! Ordered track ids with shuffle and repeat, persisted after every
//! mutation.
//!
//! [`PlaybackQueue`] wraps a [`QueueState`] with a [`QueueStore`] and an
//! optional [`EventBus`]. It has a single owner (normally the playback
//! engine) and takes `&mut self` for every mutation, so concurrent mutation
//! is ruled out by the borrow checker rather than by locking.
//!
//! A failed save is logged and does not roll back the in-memory change.

pub mod state;
pub mod store;

pub use state::{QueueState, RepeatMode};
pub use store::{MemoryQueueStore, QueueStore, SettingsQueueStore, DEFAULT_QUEUE_KEY};

use crate::error::QueueResult;
use core_library::TrackId;
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PlaybackQueue {
    state: QueueState,
    store: Arc<dyn QueueStore>,
    event_bus: Option<EventBus>,
}

impl PlaybackQueue {
    /// An empty queue backed by `store`. Nothing is loaded.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            state: QueueState::new(),
            store,
            event_bus: None,
        }
    }

    /// Load the latest saved state, repairing it if needed.
    ///
    /// An unreadable or missing state yields an empty queue.
    pub async fn restore(store: Arc<dyn QueueStore>) -> Self {
        let state = match store.load().await {
            Ok(Some(saved)) => {
                let state = saved.validated();
                info!(
                    length = state.len(),
                    current_index = ?state.current_index(),
                    "Restored playback queue"
                );
                state
            }
            Ok(None) => QueueState::new(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable playback queue");
                QueueState::new()
            }
        };

        Self {
            state,
            store,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn current(&self) -> Option<TrackId> {
        self.state.current()
    }

    pub async fn set_queue(&mut self, track_ids: Vec<TrackId>, start_at: usize) -> QueueResult<()> {
        self.state.set_queue(track_ids, start_at)?;
        self.commit().await;
        Ok(())
    }

    pub async fn insert_next(&mut self, track_id: TrackId) -> QueueResult<()> {
        self.state.insert_next(track_id)?;
        self.commit().await;
        Ok(())
    }

    pub async fn append(&mut self, track_id: TrackId) -> QueueResult<()> {
        self.state.append(track_id)?;
        self.commit().await;
        Ok(())
    }

    /// Returns whether the removed track was the current one.
    pub async fn remove(&mut self, track_id: &TrackId) -> QueueResult<bool> {
        let was_current = self.state.remove(track_id)?;
        self.commit().await;
        Ok(was_current)
    }

    pub async fn move_track(&mut self, from: usize, to: usize) -> QueueResult<()> {
        self.state.move_track(from, to)?;
        self.commit().await;
        Ok(())
    }

    pub async fn set_shuffle(&mut self, enabled: bool) {
        if !self.state.set_shuffle(enabled) {
            return;
        }
        self.emit(QueueEvent::ShuffleChanged { enabled });
        self.commit().await;
    }

    pub async fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.state.set_repeat_mode(mode);
        self.emit(QueueEvent::RepeatModeChanged {
            mode: mode.as_str().to_string(),
        });
        self.persist().await;
    }

    pub async fn jump_to(&mut self, index: usize) -> QueueResult<TrackId> {
        let track_id = self.state.jump_to(index)?;
        self.commit().await;
        Ok(track_id)
    }

    /// Next track per the repeat rules; `None` at the end of the queue.
    pub async fn advance(&mut self) -> Option<TrackId> {
        let next = self.state.advance();
        if next.is_some() {
            self.commit().await;
        }
        next
    }

    pub async fn previous(&mut self) -> Option<TrackId> {
        let prev = self.state.previous();
        if prev.is_some() {
            self.commit().await;
        }
        prev
    }

    async fn commit(&self) {
        self.emit(QueueEvent::Changed {
            length: self.state.len(),
            current_index: self.state.current_index(),
        });
        self.persist().await;
    }

    async fn persist(&self) {
        match self.store.save(&self.state).await {
            Ok(()) => debug!(length = self.state.len(), "Playback queue saved"),
            Err(e) => warn!(error = %e, "Failed to persist playback queue"),
        }
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Queue(event));
        }
    }
}
