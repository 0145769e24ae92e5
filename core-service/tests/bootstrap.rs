//! End-to-end wiring of the service façade with in-memory bridges

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioOutput, AudioQuality, AudioSource, BridgeError, CompletionNotifier, DownloadStream,
    ErrorContext, ErrorKind, ErrorSink, HttpClient, NetworkChangeStream, NetworkInfo,
    NetworkMonitor, NetworkType, ResolvedStream, SettingsStore, StorageGateway, StreamResolver,
};
use bytes::Bytes;
use core_library::{
    DownloadState, InMemoryPlaylistRepository, InMemoryTrackRepository, Playlist,
    PlaylistRepository, Track, TrackRepository,
};
use core_playback::{QueueState, QueueStore, SettingsQueueStore};
use core_service::{CoreConfig, CoreService, PlaybackPreferences};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PAYLOAD: &[u8] = b"fake-audio";

#[derive(Default)]
struct MemoryStorage {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    fn contains(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn save(&self, key: &str, data: Bytes) -> BridgeResult<String> {
        self.files.lock().unwrap().insert(key.to_string(), data);
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.contains(key))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.files.lock().unwrap().remove(key);
        Ok(())
    }

    async fn read(&self, key: &str) -> BridgeResult<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(key.to_string()))
    }
}

#[derive(Default)]
struct MapSettings {
    values: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl SettingsStore for MapSettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }
}

struct CdnResolver;

#[async_trait]
impl StreamResolver for CdnResolver {
    async fn resolve(&self, source_ref: &str, _quality: AudioQuality) -> BridgeResult<ResolvedStream> {
        Ok(ResolvedStream::new(
            format!("https://cdn.example/{}", source_ref),
            chrono::Utc::now() + chrono::Duration::hours(1),
        ))
    }
}

struct PayloadHttp;

#[async_trait]
impl HttpClient for PayloadHttp {
    async fn download_stream(&self, _url: &str) -> BridgeResult<DownloadStream> {
        Ok(DownloadStream::new(
            Some(PAYLOAD.len() as u64),
            Box::new(std::io::Cursor::new(PAYLOAD.to_vec())),
        ))
    }
}

struct SilentOutput;

#[async_trait]
impl AudioOutput for SilentOutput {
    async fn load(
        &self,
        _source: AudioSource,
        _start_at: Duration,
        _on_complete: CompletionNotifier,
    ) -> BridgeResult<Option<Duration>> {
        Ok(Some(Duration::from_secs(180)))
    }

    async fn swap_source(
        &self,
        _source: AudioSource,
        _position: Duration,
        _on_complete: CompletionNotifier,
    ) -> BridgeResult<()> {
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn seek(&self, _position: Duration) -> BridgeResult<()> {
        Ok(())
    }

    async fn position(&self) -> BridgeResult<Duration> {
        Ok(Duration::ZERO)
    }
}

#[derive(Default)]
struct CountingSink {
    reports: Mutex<Vec<ErrorKind>>,
}

impl ErrorSink for CountingSink {
    fn report(&self, kind: ErrorKind, _context: ErrorContext) {
        self.reports.lock().unwrap().push(kind);
    }
}

/// Reports one fixed state and never changes
struct FixedMonitor(NetworkInfo);

struct NeverChanges;

#[async_trait]
impl NetworkChangeStream for NeverChanges {
    async fn next(&mut self) -> Option<NetworkInfo> {
        std::future::pending().await
    }
}

#[async_trait]
impl NetworkMonitor for FixedMonitor {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        Ok(self.0.clone())
    }

    async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(NeverChanges))
    }
}

struct Fixture {
    tracks: Arc<InMemoryTrackRepository>,
    playlists: Arc<InMemoryPlaylistRepository>,
    storage: Arc<MemoryStorage>,
    settings: Arc<MapSettings>,
    sink: Arc<CountingSink>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tracks: Arc::new(InMemoryTrackRepository::new()),
            playlists: Arc::new(InMemoryPlaylistRepository::new()),
            storage: Arc::new(MemoryStorage::default()),
            settings: Arc::new(MapSettings::default()),
            sink: Arc::new(CountingSink::default()),
        }
    }

    fn config(&self, network: NetworkInfo, preferences: PlaybackPreferences) -> CoreConfig {
        CoreConfig::builder()
            .data_dir("/tmp/waveline-service-test")
            .http_client(Arc::new(PayloadHttp))
            .storage_gateway(self.storage.clone())
            .settings_store(self.settings.clone())
            .network_monitor(Arc::new(FixedMonitor(network)))
            .error_sink(self.sink.clone())
            .stream_resolver(Arc::new(CdnResolver))
            .audio_output(Arc::new(SilentOutput))
            .preferences(preferences)
            .build()
            .unwrap()
    }

    async fn bootstrap(&self) -> CoreService {
        let config = self.config(
            NetworkInfo::connected(NetworkType::WiFi),
            PlaybackPreferences::default(),
        );
        CoreService::bootstrap(config, self.tracks.clone(), self.playlists.clone())
            .await
            .unwrap()
    }

    async fn downloaded_track(&self, title: &str) -> Track {
        let mut track = Track::new(title, Some(format!("src-{}", title)));
        let key = track.id.storage_key();
        self.storage
            .save(&key, Bytes::from_static(PAYLOAD))
            .await
            .unwrap();
        track.mark_downloaded(key, PAYLOAD.len() as u64, AudioQuality::Normal);
        self.tracks.insert(&track).await.unwrap();
        track
    }
}

#[tokio::test]
async fn test_bootstrap_restores_saved_queue() {
    let fixture = Fixture::new();
    let a = fixture.downloaded_track("a").await;
    let b = fixture.downloaded_track("b").await;

    let mut saved = QueueState::new();
    saved.set_queue(vec![a.id, b.id], 1).unwrap();
    SettingsQueueStore::new(fixture.settings.clone())
        .save(&saved)
        .await
        .unwrap();

    let core = fixture.bootstrap().await;
    let restored = core.engine().queue_state().await;
    assert_eq!(restored.order(), &[a.id, b.id]);
    assert_eq!(restored.current(), Some(b.id));
}

#[tokio::test]
async fn test_bootstrap_resumes_interrupted_downloads() {
    let fixture = Fixture::new();
    let mut track = Track::new("left behind", Some("src-left".to_string()));
    track.mark_downloading();
    fixture.tracks.insert(&track).await.unwrap();

    let _core = fixture.bootstrap().await;

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = fixture.tracks.find_by_id(&track.id).await.unwrap().unwrap();
            if current.download_state == DownloadState::Downloaded {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let key = finished.local_key.unwrap();
    assert!(fixture.storage.contains(&key));
    assert!(fixture.sink.reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_policy_seeded_from_monitor() {
    let fixture = Fixture::new();
    let config = fixture.config(
        NetworkInfo::connected(NetworkType::Cellular),
        PlaybackPreferences::default().with_cellular(true, false),
    );

    let core = CoreService::bootstrap(config, fixture.tracks.clone(), fixture.playlists.clone())
        .await
        .unwrap();

    assert!(core.policy().can_stream());
    assert!(!core.policy().can_download());
}

#[tokio::test]
async fn test_delete_playlist_keeps_shared_tracks() {
    let fixture = Fixture::new();
    let only_here = fixture.downloaded_track("only-here").await;
    let shared = fixture.downloaded_track("shared").await;

    let doomed = Playlist::new("Doomed").with_tracks([only_here.id, shared.id]);
    let keeper = Playlist::new("Keeper").with_tracks([shared.id]);
    fixture.playlists.insert(&doomed).await.unwrap();
    fixture.playlists.insert(&keeper).await.unwrap();

    let core = fixture.bootstrap().await;
    let report = core.delete_playlist(&doomed.id).await.unwrap();

    assert_eq!(report.deleted_tracks, vec![only_here.id]);
    assert_eq!(report.retained_tracks, vec![shared.id]);
    assert!(!fixture.storage.contains(&only_here.id.storage_key()));
    assert!(fixture.storage.contains(&shared.id.storage_key()));
    assert!(fixture.playlists.find_by_id(&doomed.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_stops_playback_and_scheduler() {
    let fixture = Fixture::new();
    let track = fixture.downloaded_track("playing").await;

    let core = fixture.bootstrap().await;
    core.engine().play(track.id).await.unwrap();
    assert!(core.engine().snapshot().is_playing());

    core.shutdown().await;
    assert!(!core.engine().snapshot().is_playing());
    assert!(core
        .scheduler()
        .enqueue(core_playback::DownloadRequest::new(track.id))
        .await
        .is_err());
}

#[tokio::test]
async fn test_invalid_preferences_rejected_before_bootstrap() {
    let fixture = Fixture::new();
    let built = CoreConfig::builder()
        .data_dir("/tmp/waveline-service-test")
        .http_client(Arc::new(PayloadHttp))
        .storage_gateway(fixture.storage.clone())
        .settings_store(fixture.settings.clone())
        .error_sink(fixture.sink.clone())
        .stream_resolver(Arc::new(CdnResolver))
        .audio_output(Arc::new(SilentOutput))
        .preferences(PlaybackPreferences::default().with_max_download_attempts(0))
        .build();

    assert!(built.is_err());
}
