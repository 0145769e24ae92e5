//! In-memory bridges shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioOutput, AudioQuality, AudioSource, BridgeError, CompletionNotifier, DownloadStream,
    ErrorContext, ErrorKind, ErrorSink, HttpClient, ResolvedStream, StorageGateway,
    StreamResolver,
};
use bytes::Bytes;
use chrono::Utc;
use core_library::{InMemoryTrackRepository, Track, TrackId, TrackRepository};
use core_playback::{
    DownloadConfig, DownloadScheduler, EngineConfig, EngineContext, MemoryQueueStore,
    NetworkPolicy, PlaybackEngine, PlaybackQueue,
};
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const PAYLOAD: &[u8] = b"ID3-fake-audio-payload";

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.files.lock().contains_key(key)
    }

    pub fn put(&self, key: &str, data: &'static [u8]) {
        self.files.lock().insert(key.to_string(), Bytes::from_static(data));
    }
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn save(&self, key: &str, data: Bytes) -> BridgeResult<String> {
        self.files.lock().insert(key.to_string(), data);
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> BridgeResult<bool> {
        Ok(self.contains(key))
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.files.lock().remove(key);
        Ok(())
    }

    async fn read(&self, key: &str) -> BridgeResult<Bytes> {
        self.files
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(key.to_string()))
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Default)]
pub struct StubResolver {
    calls: AtomicUsize,
    failures_left: AtomicU32,
    always_fail: AtomicBool,
}

impl StubResolver {
    pub fn url_for(source_ref: &str) -> String {
        format!("https://cdn.test/{}?sig=secret", source_ref)
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn fail_always(&self) {
        self.always_fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamResolver for StubResolver {
    async fn resolve(&self, source_ref: &str, _quality: AudioQuality) -> BridgeResult<ResolvedStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.always_fail.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("resolver unavailable".to_string()));
        }
        Ok(ResolvedStream::new(
            Self::url_for(source_ref),
            Utc::now() + chrono::Duration::hours(1),
        ))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// HTTP client serving [`PAYLOAD`] for every URL.
///
/// When gated, each fetch waits for a permit from [`StubHttpClient::release`].
pub struct StubHttpClient {
    gate: Option<Semaphore>,
    requested: Mutex<Vec<String>>,
    request_times: Mutex<Vec<tokio::time::Instant>>,
    waiting: AtomicUsize,
    max_waiting: AtomicUsize,
    failures_left: AtomicU32,
    always_fail: AtomicBool,
}

impl StubHttpClient {
    pub fn open() -> Self {
        Self::build(None)
    }

    pub fn gated() -> Self {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            gate,
            requested: Mutex::new(Vec::new()),
            request_times: Mutex::new(Vec::new()),
            waiting: AtomicUsize::new(0),
            max_waiting: AtomicUsize::new(0),
            failures_left: AtomicU32::new(0),
            always_fail: AtomicBool::new(false),
        }
    }

    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn fail_always(&self) {
        self.always_fail.store(true, Ordering::SeqCst);
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }

    pub fn request_times(&self) -> Vec<tokio::time::Instant> {
        self.request_times.lock().clone()
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for StubHttpClient {
    async fn download_stream(&self, url: &str) -> BridgeResult<DownloadStream> {
        self.requested.lock().push(url.to_string());
        self.request_times.lock().push(tokio::time::Instant::now());

        let now_waiting = self.waiting.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_waiting.fetch_max(now_waiting, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.always_fail.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("connection reset".to_string()));
        }

        Ok(DownloadStream::new(
            Some(PAYLOAD.len() as u64),
            Box::new(std::io::Cursor::new(Bytes::from_static(PAYLOAD))),
        ))
    }
}

// ============================================================================
// Audio Output
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Load { remote: bool, start_at: Duration },
    Swap { remote: bool, position: Duration },
    Play,
    Pause,
    Stop,
    Seek(Duration),
}

#[derive(Default)]
pub struct RecordingOutput {
    calls: Mutex<Vec<OutputCall>>,
    position: Mutex<Duration>,
    reported_duration: Mutex<Option<Duration>>,
    notifier: Mutex<Option<CompletionNotifier>>,
    fail_load: AtomicBool,
    fail_swap: AtomicBool,
}

impl RecordingOutput {
    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().clone()
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock() = position;
    }

    pub fn set_reported_duration(&self, duration: Option<Duration>) {
        *self.reported_duration.lock() = duration;
    }

    pub fn fail_swaps(&self) {
        self.fail_swap.store(true, Ordering::SeqCst);
    }

    pub fn fail_loads(&self) {
        self.fail_load.store(true, Ordering::SeqCst);
    }

    /// Simulate the active source finishing.
    pub fn finish_source(&self) {
        let notifier = self.notifier.lock().clone();
        if let Some(notifier) = notifier {
            notifier.notify();
        }
    }

    fn record(&self, call: OutputCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn load(
        &self,
        source: AudioSource,
        start_at: Duration,
        on_complete: CompletionNotifier,
    ) -> BridgeResult<Option<Duration>> {
        self.record(OutputCall::Load {
            remote: source.is_remote(),
            start_at,
        });
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("decoder rejected source".to_string()));
        }
        *self.notifier.lock() = Some(on_complete);
        *self.position.lock() = start_at;
        Ok(*self.reported_duration.lock())
    }

    async fn swap_source(
        &self,
        source: AudioSource,
        position: Duration,
        on_complete: CompletionNotifier,
    ) -> BridgeResult<()> {
        self.record(OutputCall::Swap {
            remote: source.is_remote(),
            position,
        });
        if self.fail_swap.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("swap rejected".to_string()));
        }
        *self.notifier.lock() = Some(on_complete);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record(OutputCall::Play);
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record(OutputCall::Pause);
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.record(OutputCall::Stop);
        *self.notifier.lock() = None;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> BridgeResult<()> {
        self.record(OutputCall::Seek(position));
        *self.position.lock() = position;
        Ok(())
    }

    async fn position(&self) -> BridgeResult<Duration> {
        Ok(*self.position.lock())
    }
}

// ============================================================================
// Error Sink
// ============================================================================

#[derive(Default)]
pub struct RecordingErrorSink {
    reports: Mutex<Vec<(ErrorKind, ErrorContext)>>,
}

impl RecordingErrorSink {
    pub fn reports(&self) -> Vec<(ErrorKind, ErrorContext)> {
        self.reports.lock().clone()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.reports.lock().iter().map(|(kind, _)| *kind).collect()
    }
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, kind: ErrorKind, context: ErrorContext) {
        self.reports.lock().push((kind, context));
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub tracks: Arc<InMemoryTrackRepository>,
    pub storage: Arc<MemoryStorage>,
    pub resolver: Arc<StubResolver>,
    pub http: Arc<StubHttpClient>,
    pub output: Arc<RecordingOutput>,
    pub sink: Arc<RecordingErrorSink>,
    pub event_bus: EventBus,
    pub policy: NetworkPolicy,
}

impl Harness {
    pub fn new(http: StubHttpClient) -> Self {
        Self {
            tracks: Arc::new(InMemoryTrackRepository::new()),
            storage: Arc::new(MemoryStorage::default()),
            resolver: Arc::new(StubResolver::default()),
            http: Arc::new(http),
            output: Arc::new(RecordingOutput::default()),
            sink: Arc::new(RecordingErrorSink::default()),
            event_bus: EventBus::new(1024),
            policy: NetworkPolicy::unrestricted(),
        }
    }

    pub fn scheduler(&self, config: DownloadConfig) -> DownloadScheduler {
        self.scheduler_with_sink(config, self.sink.clone())
    }

    pub fn scheduler_with_sink(
        &self,
        config: DownloadConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> DownloadScheduler {
        DownloadScheduler::new(
            config,
            self.tracks.clone(),
            self.resolver.clone(),
            self.http.clone(),
            self.storage.clone(),
            sink,
            self.event_bus.clone(),
        )
    }

    pub fn engine(&self, scheduler: DownloadScheduler, config: EngineConfig) -> PlaybackEngine {
        let ctx = EngineContext {
            tracks: self.tracks.clone(),
            storage: self.storage.clone(),
            resolver: self.resolver.clone(),
            output: self.output.clone(),
            scheduler,
            policy: self.policy.clone(),
            error_sink: self.sink.clone(),
            event_bus: self.event_bus.clone(),
        };
        let queue = PlaybackQueue::new(Arc::new(MemoryQueueStore::new()));
        PlaybackEngine::new(config, ctx, queue)
    }

    /// Insert a streamable track that is not downloaded.
    pub async fn remote_track(&self, title: &str) -> TrackId {
        let track = Track::new(title, Some(format!("src-{}", title)));
        let id = track.id;
        self.tracks.insert(&track).await.unwrap();
        id
    }

    /// Insert a track whose payload is already stored.
    pub async fn downloaded_track(&self, title: &str, duration_seconds: f64) -> TrackId {
        let mut track =
            Track::new(title, Some(format!("src-{}", title))).with_duration_seconds(duration_seconds);
        let key = track.id.storage_key();
        self.storage.put(&key, PAYLOAD);
        track.mark_downloaded(key, PAYLOAD.len() as u64, AudioQuality::Normal);
        let id = track.id;
        self.tracks.insert(&track).await.unwrap();
        id
    }

    pub async fn track(&self, id: &TrackId) -> Track {
        self.tracks.find_by_id(id).await.unwrap().unwrap()
    }
}
