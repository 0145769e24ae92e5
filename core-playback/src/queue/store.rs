//! Durable storage for the playback queue

use crate::error::{QueueError, QueueResult};
use crate::queue::state::QueueState;
use async_trait::async_trait;
use bridge_traits::SettingsStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Settings key holding the serialized queue
pub const DEFAULT_QUEUE_KEY: &str = "playback.queue_state";

/// Load/save contract for [`QueueState`].
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Latest saved state, `None` if nothing was saved yet.
    async fn load(&self) -> QueueResult<Option<QueueState>>;

    /// Replace the saved state.
    async fn save(&self, state: &QueueState) -> QueueResult<()>;
}

/// Stores the queue as JSON under one key of a [`SettingsStore`].
pub struct SettingsQueueStore {
    settings: Arc<dyn SettingsStore>,
    key: String,
}

impl SettingsQueueStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

#[async_trait]
impl QueueStore for SettingsQueueStore {
    async fn load(&self) -> QueueResult<Option<QueueState>> {
        let raw = self
            .settings
            .get_string(&self.key)
            .await
            .map_err(|e| QueueError::Persistence(e.to_string()))?;

        raw.map(|json| serde_json::from_str(&json).map_err(|e| QueueError::Corrupt(e.to_string())))
            .transpose()
    }

    async fn save(&self, state: &QueueState) -> QueueResult<()> {
        let json =
            serde_json::to_string(state).map_err(|e| QueueError::Persistence(e.to_string()))?;
        self.settings
            .set_string(&self.key, &json)
            .await
            .map_err(|e| QueueError::Persistence(e.to_string()))
    }
}

/// Process-local store, for hosts without durable settings and for tests.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    saved: Mutex<Option<QueueState>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved state
    pub fn snapshot(&self) -> Option<QueueState> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load(&self) -> QueueResult<Option<QueueState>> {
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, state: &QueueState) -> QueueResult<()> {
        *self.saved.lock() = Some(state.clone());
        Ok(())
    }
}
