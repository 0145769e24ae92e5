use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::SettingsStore;
use core_library::TrackId;
use core_playback::{PlaybackQueue, QueueStore, RepeatMode, SettingsQueueStore, DEFAULT_QUEUE_KEY};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct MapSettings {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MapSettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}

fn ids(n: usize) -> Vec<TrackId> {
    (0..n).map(|_| TrackId::new()).collect()
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let settings = Arc::new(MapSettings::default());
    let store: Arc<dyn QueueStore> = Arc::new(SettingsQueueStore::new(settings.clone()));
    let tracks = ids(5);

    let mut queue = PlaybackQueue::new(store.clone());
    queue.set_queue(tracks.clone(), 2).await.unwrap();
    queue.set_shuffle(true).await;
    queue.set_repeat_mode(RepeatMode::All).await;
    let before = queue.state().clone();
    assert!(settings.values.lock().contains_key(DEFAULT_QUEUE_KEY));

    let restored = PlaybackQueue::restore(store).await;
    assert_eq!(restored.state(), &before);
    assert_eq!(restored.current(), Some(tracks[2]));
    assert!(restored.state().shuffle_enabled());
    assert_eq!(restored.state().repeat_mode(), RepeatMode::All);
}

#[tokio::test]
async fn test_unshuffle_after_restart_restores_original_order() {
    let settings = Arc::new(MapSettings::default());
    let store: Arc<dyn QueueStore> = Arc::new(SettingsQueueStore::new(settings));
    let tracks = ids(8);

    let mut queue = PlaybackQueue::new(store.clone());
    queue.set_queue(tracks.clone(), 0).await.unwrap();
    queue.set_shuffle(true).await;
    drop(queue);

    let mut restored = PlaybackQueue::restore(store).await;
    let current = restored.current();
    restored.set_shuffle(false).await;
    assert_eq!(restored.state().order(), tracks.as_slice());
    assert_eq!(restored.current(), current);
}

#[tokio::test]
async fn test_corrupt_state_restores_empty() {
    let settings = Arc::new(MapSettings::default());
    settings
        .set_string(DEFAULT_QUEUE_KEY, "{not json")
        .await
        .unwrap();
    let store: Arc<dyn QueueStore> = Arc::new(SettingsQueueStore::new(settings));

    let queue = PlaybackQueue::restore(store).await;
    assert!(queue.state().is_empty());
    assert_eq!(queue.current(), None);
}

#[tokio::test]
async fn test_mutations_publish_queue_events() {
    let store: Arc<dyn QueueStore> = Arc::new(core_playback::MemoryQueueStore::new());
    let event_bus = EventBus::new(64);
    let mut rx = event_bus.subscribe();
    let mut queue = PlaybackQueue::new(store).with_event_bus(event_bus);

    let tracks = ids(3);
    queue.set_queue(tracks.clone(), 0).await.unwrap();
    queue.append(TrackId::new()).await.unwrap();
    queue.set_repeat_mode(RepeatMode::One).await;

    let mut events = Vec::new();
    while let Ok(CoreEvent::Queue(event)) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.contains(&QueueEvent::Changed {
        length: 4,
        current_index: Some(0)
    }));
    assert!(events.contains(&QueueEvent::RepeatModeChanged {
        mode: "one".to_string()
    }));
}
