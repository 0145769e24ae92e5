//! Audio Output Abstraction
//!
//! The device-side audio scheduling primitive the playback engine drives.
//! Decoding, mixing and device routing all live behind this trait.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Where audio for the active source comes from
#[derive(Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Payload read from the storage gateway
    LocalFile { key: String, data: Bytes },
    /// Remote URL streamed by the output
    RemoteStream { url: String },
}

impl AudioSource {
    pub fn is_remote(&self) -> bool {
        matches!(self, AudioSource::RemoteStream { .. })
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::LocalFile { key, data } => f
                .debug_struct("LocalFile")
                .field("key", key)
                .field("bytes", &data.len())
                .finish(),
            // Signed URLs stay out of debug output
            AudioSource::RemoteStream { .. } => f.debug_struct("RemoteStream").finish_non_exhaustive(),
        }
    }
}

/// Completion callback handed to the output with each source.
///
/// The output invokes it once when the source it was attached to finishes
/// playing naturally. It is never invoked on `stop` or when the source is
/// replaced.
#[derive(Clone)]
pub struct CompletionNotifier(Arc<dyn Fn() + Send + Sync>);

impl CompletionNotifier {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A notifier that does nothing
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn notify(&self) {
        (self.0)()
    }
}

impl fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionNotifier")
    }
}

/// Audio output trait
///
/// # Platform Support
///
/// - **Desktop**: cpal / rodio style output
/// - **iOS**: AVAudioEngine player node scheduling
/// - **Android**: ExoPlayer / AudioTrack
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Load `source` as the active source, positioned at `start_at`, paused.
    ///
    /// Returns the source duration when the output can determine it.
    async fn load(
        &self,
        source: AudioSource,
        start_at: Duration,
        on_complete: CompletionNotifier,
    ) -> Result<Option<Duration>>;

    /// Replace the active source with `source` positioned at `position`
    /// without interrupting audible output.
    async fn swap_source(
        &self,
        source: AudioSource,
        position: Duration,
        on_complete: CompletionNotifier,
    ) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Stop and unload the active source
    async fn stop(&self) -> Result<()>;

    async fn seek(&self, position: Duration) -> Result<()>;

    /// Current playback position of the active source
    async fn position(&self) -> Result<Duration>;
}
