//! # Playback Engine
//!
//! State machine that owns "what is audible right now".
//!
//! ## Overview
//!
//! The engine decides per track whether to play a stored payload or to
//! stream, drives the [`PlaybackQueue`] on skip and auto-advance, and swaps
//! a stream for the local payload once its background download lands.
//!
//! ## Serialization
//!
//! Every mutation goes through one `tokio::sync::Mutex<EngineInner>`.
//! Commands take the lock directly. Asynchronous inputs (completion
//! callbacks, timer ticks, background download outcomes) are sent as
//! [`EngineSignal`]s to a single signal loop that takes the same lock. Each
//! loaded source gets a new generation number; signals from an older
//! generation are dropped.
//!
//! ```text
//!  UI commands ──────────────┐
//!                            ▼
//!  completion callback ─┐  ┌──────────────────┐     ┌─────────────┐
//!  time update timer ───┼─>│  signal loop     │────>│ EngineInner │
//!  end-of-track poll ───┤  └──────────────────┘     └─────────────┘
//!  download watcher ────┘
//! ```
//!
//! ## Play decision
//!
//! ```text
//! downloaded? ── yes ──> read payload ──> play local
//!      │ no
//! can_stream? ── no ───> TrackNotDownloaded
//!      │ yes
//! resolve ── err ──> StreamingFailed
//!      │ ok
//! play remote, and if can_download: submit background download
//!      └─> on completion: swap to local at the current position
//! ```

pub mod config;
pub mod state;
mod timers;

pub use config::EngineConfig;
pub use state::{EngineSnapshot, PlaybackPhase};

use crate::download::{DownloadOutcome, DownloadRequest, DownloadScheduler};
use crate::error::{DownloadError, PlaybackError, Result};
use crate::policy::NetworkPolicy;
use crate::queue::{PlaybackQueue, QueueState, RepeatMode};
use bridge_traits::{
    AudioOutput, AudioSource, CompletionNotifier, ErrorContext, ErrorSink, ResolvedStream,
    StorageGateway, StreamResolver,
};
use core_library::{Track, TrackId, TrackRepository};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use std::sync::{Arc, Weak};
use std::time::Duration;
use timers::PlaybackTimers;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Asynchronous inputs funneled into the engine's serialization point.
#[derive(Debug)]
pub(crate) enum EngineSignal {
    /// The audio output finished the source loaded for `generation`.
    SourceCompleted { generation: u64 },
    TimeTick { generation: u64 },
    EndOfTrackPoll { generation: u64 },
    /// Background download of the streamed track reached a terminal state.
    DownloadFinished {
        generation: u64,
        track_id: TrackId,
        outcome: DownloadOutcome,
    },
}

/// Collaborators the engine drives.
pub struct EngineContext {
    pub tracks: Arc<dyn TrackRepository>,
    pub storage: Arc<dyn StorageGateway>,
    pub resolver: Arc<dyn StreamResolver>,
    pub output: Arc<dyn AudioOutput>,
    pub scheduler: DownloadScheduler,
    pub policy: NetworkPolicy,
    pub error_sink: Arc<dyn ErrorSink>,
    pub event_bus: EventBus,
}

struct EngineInner {
    phase: PlaybackPhase,
    current_track: Option<TrackId>,
    current_time: Duration,
    duration: Option<Duration>,
    streaming: bool,
    generation: u64,
    queue: PlaybackQueue,
    timers: PlaybackTimers,
    download_watcher: Option<JoinHandle<()>>,
}

impl EngineInner {
    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.phase,
            current_track_id: self.current_track,
            current_time: self.current_time,
            duration: self.duration,
            is_streaming_source: self.streaming,
        }
    }

    fn abort_download_watcher(&mut self) {
        if let Some(handle) = self.download_watcher.take() {
            handle.abort();
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.abort_download_watcher();
    }
}

struct EngineShared {
    config: EngineConfig,
    ctx: EngineContext,
    inner: Mutex<EngineInner>,
    snapshot: watch::Sender<EngineSnapshot>,
    signals: mpsc::UnboundedSender<EngineSignal>,
}

// ============================================================================
// Public API
// ============================================================================

/// The playback engine. Cheap to clone; clones drive one session.
#[derive(Clone)]
pub struct PlaybackEngine {
    shared: Arc<EngineShared>,
}

impl PlaybackEngine {
    /// Create an engine around an already restored queue.
    ///
    /// Must be called inside a tokio runtime; the signal loop is spawned here.
    pub fn new(config: EngineConfig, ctx: EngineContext, queue: PlaybackQueue) -> Self {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(EngineSnapshot::default());

        let shared = Arc::new(EngineShared {
            config,
            ctx,
            inner: Mutex::new(EngineInner {
                phase: PlaybackPhase::Idle,
                current_track: None,
                current_time: Duration::ZERO,
                duration: None,
                streaming: false,
                generation: 0,
                queue,
                timers: PlaybackTimers::default(),
                download_watcher: None,
            }),
            snapshot,
            signals,
        });

        tokio::spawn(run_signal_loop(Arc::downgrade(&shared), signal_rx));
        Self { shared }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn scheduler(&self) -> &DownloadScheduler {
        &self.shared.ctx.scheduler
    }

    pub fn policy(&self) -> &NetworkPolicy {
        &self.shared.ctx.policy
    }

    /// Play a track, from storage if downloaded, otherwise streamed.
    ///
    /// If the track is queued it also becomes the queue's current track.
    ///
    /// # Errors
    /// - [`PlaybackError::TrackNotDownloaded`] when streaming is not allowed
    /// - [`PlaybackError::StreamingFailed`] when resolution or the stream fails
    /// - [`PlaybackError::FileNotFound`] / [`PlaybackError::FileLoadFailed`]
    ///   when the stored payload is missing or unreadable
    ///
    /// Every error is reported and leaves the engine `Stopped`.
    #[instrument(skip(self), fields(track_id = %track_id))]
    pub async fn play(&self, track_id: TrackId) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if let Some(index) = inner.queue.state().order().iter().position(|id| *id == track_id) {
            if inner.queue.state().current_index() != Some(index) {
                inner.queue.jump_to(index).await?;
            }
        }
        self.shared.start_track(&mut inner, track_id).await
    }

    /// [`play`](Self::play), falling back to a foreground download when
    /// streaming fails, then playing the stored payload.
    #[instrument(skip(self), fields(track_id = %track_id))]
    pub async fn play_with_fallback(&self, track_id: TrackId) -> Result<()> {
        let reason = match self.play(track_id).await {
            Err(PlaybackError::StreamingFailed(reason)) => reason,
            other => return other,
        };

        warn!(reason = %reason, "Streaming failed, downloading before playback");
        let ticket = self
            .shared
            .ctx
            .scheduler
            .submit(DownloadRequest::new(track_id))
            .await?;

        match ticket.wait().await {
            DownloadOutcome::Completed => self.play(track_id).await,
            DownloadOutcome::Cancelled => Err(DownloadError::Cancelled.into()),
            DownloadOutcome::Failed { message, .. } => Err(PlaybackError::StreamingFailed(
                format!("{}; download fallback failed: {}", reason, message),
            )),
            DownloadOutcome::NotScheduled => Err(PlaybackError::StreamingFailed(reason)),
        }
    }

    pub async fn pause(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.shared.pause(&mut inner).await
    }

    pub async fn resume(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.shared.resume(&mut inner).await
    }

    /// Pause when playing, resume when paused, start the queue's current
    /// track when stopped.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        match inner.phase {
            PlaybackPhase::Playing => self.shared.pause(&mut inner).await,
            PlaybackPhase::Paused => self.shared.resume(&mut inner).await,
            PlaybackPhase::Idle | PlaybackPhase::Stopped => match inner.queue.current() {
                Some(track_id) => self.shared.start_track(&mut inner, track_id).await,
                None => Ok(()),
            },
            PlaybackPhase::ResolvingOrLoading | PlaybackPhase::TransitioningSourceswap => Ok(()),
        }
    }

    /// Seek within the current track.
    ///
    /// Rejected with [`PlaybackError::SeekFailed`] while the duration is
    /// unknown; the rejection is reported and playback continues.
    #[instrument(skip(self))]
    pub async fn seek(&self, position: Duration) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.shared.seek(&mut inner, position).await
    }

    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.shared.stop_session(&mut inner).await;
        Ok(())
    }

    /// Advance the queue and play the result; stop at the end of the queue.
    pub async fn skip_to_next(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.shared.advance(&mut inner).await
    }

    pub async fn skip_to_previous(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        match inner.queue.previous().await {
            Some(track_id) => self.shared.start_track(&mut inner, track_id).await,
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Queue facade
    // ------------------------------------------------------------------------

    pub async fn queue_state(&self) -> QueueState {
        self.shared.inner.lock().await.queue.state().clone()
    }

    /// Replace the queue without starting playback.
    pub async fn set_queue(&self, track_ids: Vec<TrackId>, start_at: usize) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.queue.set_queue(track_ids, start_at).await?;
        Ok(())
    }

    /// Make `index` current and play it.
    pub async fn play_queue(&self, index: usize) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let track_id = inner.queue.jump_to(index).await?;
        self.shared.start_track(&mut inner, track_id).await
    }

    pub async fn insert_next(&self, track_id: TrackId) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.queue.insert_next(track_id).await?;
        Ok(())
    }

    pub async fn append(&self, track_id: TrackId) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.queue.append(track_id).await?;
        Ok(())
    }

    /// Remove a queued track. Removing the loaded track continues with the
    /// new current track if it was playing, and stops otherwise.
    pub async fn remove_from_queue(&self, track_id: &TrackId) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.queue.remove(track_id).await?;

        if inner.current_track != Some(*track_id) || !inner.phase.has_source() {
            return Ok(());
        }

        match (inner.queue.current(), inner.phase) {
            (Some(next), PlaybackPhase::Playing) => self.shared.start_track(&mut inner, next).await,
            _ => {
                self.shared.stop_session(&mut inner).await;
                Ok(())
            }
        }
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        inner.queue.move_track(from, to).await?;
        Ok(())
    }

    pub async fn set_shuffle(&self, enabled: bool) {
        self.shared.inner.lock().await.queue.set_shuffle(enabled).await;
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) {
        self.shared.inner.lock().await.queue.set_repeat_mode(mode).await;
    }

    /// Number of live playback timers.
    #[doc(hidden)]
    pub async fn active_timer_count(&self) -> usize {
        self.shared.inner.lock().await.timers.active()
    }
}

// ============================================================================
// Session Management
// ============================================================================

impl EngineShared {
    fn publish(&self, inner: &EngineInner) {
        self.snapshot.send_replace(inner.snapshot());
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.ctx.event_bus.emit(CoreEvent::Playback(event));
    }

    /// Completion callback for a source loaded in `generation`.
    fn completion_notifier(&self, generation: u64) -> CompletionNotifier {
        let signals = self.signals.clone();
        CompletionNotifier::new(move || {
            let _ = signals.send(EngineSignal::SourceCompleted { generation });
        })
    }

    /// Tear down the current source; bumps the generation.
    async fn release_source(&self, inner: &mut EngineInner) {
        inner.timers.cancel_all();
        inner.abort_download_watcher();
        inner.generation += 1;

        if inner.phase.has_source() || inner.phase == PlaybackPhase::ResolvingOrLoading {
            if let Err(e) = self.ctx.output.stop().await {
                warn!(error = %e, "Audio output failed to stop");
            }
        }
    }

    async fn stop_session(&self, inner: &mut EngineInner) {
        self.release_source(inner).await;
        inner.phase = PlaybackPhase::Stopped;
        inner.current_time = Duration::ZERO;
        inner.streaming = false;
        self.publish(inner);

        info!(track_id = ?inner.current_track, "Playback stopped");
        self.emit(PlaybackEvent::Stopped {
            track_id: inner.current_track.map(|id| id.to_string()),
        });
    }

    /// Load and start `track_id`, reporting any failure.
    async fn start_track(&self, inner: &mut EngineInner, track_id: TrackId) -> Result<()> {
        let result = self.load_and_play(inner, track_id).await;
        if let Err(err) = &result {
            self.fail(inner, track_id, err).await;
        }
        result
    }

    async fn load_and_play(&self, inner: &mut EngineInner, track_id: TrackId) -> Result<()> {
        self.release_source(inner).await;
        inner.phase = PlaybackPhase::ResolvingOrLoading;
        inner.current_track = Some(track_id);
        inner.current_time = Duration::ZERO;
        inner.duration = None;
        inner.streaming = false;
        self.publish(inner);

        let track = self
            .ctx
            .tracks
            .find_by_id(&track_id)
            .await?
            .ok_or_else(|| PlaybackError::UnknownTrack(track_id.to_string()))?;
        let notifier = self.completion_notifier(inner.generation);

        let reported_duration = if track.is_downloaded() {
            self.load_local(&track, notifier).await?
        } else {
            if !self.ctx.policy.can_stream() {
                return Err(PlaybackError::TrackNotDownloaded(track_id.to_string()));
            }
            let (resolved, duration) = self.load_stream(&track, notifier).await?;
            inner.streaming = true;

            if self.config.download_while_streaming && self.ctx.policy.can_download() {
                self.start_background_download(inner, track_id, resolved).await;
            }
            duration
        };

        inner.duration = reported_duration.or_else(|| {
            track
                .duration_seconds
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        });

        self.ctx
            .output
            .play()
            .await
            .map_err(PlaybackError::engine)?;

        inner.phase = PlaybackPhase::Playing;
        self.start_timers(inner);
        self.publish(inner);

        info!(
            track_id = %track_id,
            streaming = inner.streaming,
            duration_ms = ?inner.duration.map(|d| d.as_millis() as u64),
            "Playback started"
        );
        self.emit(PlaybackEvent::Started {
            track_id: track_id.to_string(),
            streaming: inner.streaming,
        });
        Ok(())
    }

    async fn load_local(
        &self,
        track: &Track,
        notifier: CompletionNotifier,
    ) -> Result<Option<Duration>> {
        let key = track
            .local_key
            .clone()
            .unwrap_or_else(|| track.id.storage_key());

        let data = self.ctx.storage.read(&key).await.map_err(|e| {
            if e.is_not_found() {
                PlaybackError::FileNotFound(format!("{} ({})", track.id, key))
            } else {
                PlaybackError::FileLoadFailed(e.to_string())
            }
        })?;
        debug!(track_id = %track.id, bytes = data.len(), "Loaded stored payload");

        self.ctx
            .output
            .load(AudioSource::LocalFile { key, data }, Duration::ZERO, notifier)
            .await
            .map_err(|e| PlaybackError::FileLoadFailed(e.to_string()))
    }

    async fn load_stream(
        &self,
        track: &Track,
        notifier: CompletionNotifier,
    ) -> Result<(ResolvedStream, Option<Duration>)> {
        let source_ref = track.source_ref.as_deref().ok_or_else(|| {
            PlaybackError::StreamingFailed(format!("track {} has no source", track.id))
        })?;

        let resolved = self
            .ctx
            .resolver
            .resolve(source_ref, self.config.streaming_quality)
            .await
            .map_err(|e| PlaybackError::StreamingFailed(e.to_string()))?;

        let duration = self
            .ctx
            .output
            .load(
                AudioSource::RemoteStream {
                    url: resolved.audio_url.clone(),
                },
                Duration::ZERO,
                notifier,
            )
            .await
            .map_err(|e| PlaybackError::StreamingFailed(e.to_string()))?;

        Ok((resolved, duration))
    }

    /// Hand the streamed track to the scheduler and watch for completion.
    async fn start_background_download(
        &self,
        inner: &mut EngineInner,
        track_id: TrackId,
        resolved: ResolvedStream,
    ) {
        let request = DownloadRequest::new(track_id)
            .with_quality(self.config.streaming_quality)
            .with_resolved_stream(resolved);

        let ticket = match self.ctx.scheduler.submit(request).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(track_id = %track_id, error = %e, "Background download not started");
                return;
            }
        };
        debug!(track_id = %track_id, outcome = ?ticket.outcome, "Background download submitted");

        let generation = inner.generation;
        let signals = self.signals.clone();
        inner.download_watcher = Some(tokio::spawn(async move {
            let outcome = ticket.wait().await;
            let _ = signals.send(EngineSignal::DownloadFinished {
                generation,
                track_id,
                outcome,
            });
        }));
    }

    /// Switch the streamed source to the stored payload at the current
    /// position. A failed swap keeps the stream playing.
    async fn swap_to_local(&self, inner: &mut EngineInner, track_id: TrackId) {
        let track = match self.ctx.tracks.find_by_id(&track_id).await {
            Ok(Some(track)) if track.is_downloaded() => track,
            Ok(_) => {
                debug!(track_id = %track_id, "Track not downloaded, keeping stream");
                return;
            }
            Err(e) => {
                warn!(track_id = %track_id, error = %e, "Failed to load track for swap");
                return;
            }
        };

        let key = track
            .local_key
            .clone()
            .unwrap_or_else(|| track_id.storage_key());
        let data = match self.ctx.storage.read(&key).await {
            Ok(data) => data,
            Err(e) => {
                warn!(track_id = %track_id, error = %e, "Stored payload unreadable, keeping stream");
                return;
            }
        };

        let resume_phase = inner.phase;
        inner.phase = PlaybackPhase::TransitioningSourceswap;
        self.publish(inner);

        let position = match self.ctx.output.position().await {
            Ok(position) => position,
            Err(_) => inner.current_time,
        };
        let notifier = self.completion_notifier(inner.generation);

        match self
            .ctx
            .output
            .swap_source(AudioSource::LocalFile { key, data }, position, notifier)
            .await
        {
            Ok(()) => {
                inner.streaming = false;
                inner.current_time = position;
                inner.phase = resume_phase;
                self.publish(inner);

                info!(
                    track_id = %track_id,
                    position_ms = position.as_millis() as u64,
                    "Switched to local source"
                );
                self.emit(PlaybackEvent::SourceSwapped {
                    track_id: track_id.to_string(),
                    position_ms: position.as_millis() as u64,
                });
            }
            Err(e) => {
                inner.phase = resume_phase;
                self.publish(inner);
                warn!(track_id = %track_id, error = %e, "Source swap failed, keeping stream");
            }
        }
    }

    async fn pause(&self, inner: &mut EngineInner) -> Result<()> {
        if inner.phase != PlaybackPhase::Playing {
            return Ok(());
        }

        self.ctx.output.pause().await.map_err(PlaybackError::engine)?;
        inner.timers.cancel_all();
        if let Ok(position) = self.ctx.output.position().await {
            inner.current_time = position;
        }
        inner.phase = PlaybackPhase::Paused;
        self.publish(inner);

        if let Some(track_id) = inner.current_track {
            self.emit(PlaybackEvent::Paused {
                track_id: track_id.to_string(),
                position_ms: inner.current_time.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn resume(&self, inner: &mut EngineInner) -> Result<()> {
        if inner.phase != PlaybackPhase::Paused {
            return Ok(());
        }

        self.ctx.output.play().await.map_err(PlaybackError::engine)?;
        inner.phase = PlaybackPhase::Playing;
        self.start_timers(inner);
        self.publish(inner);

        if let Some(track_id) = inner.current_track {
            self.emit(PlaybackEvent::Resumed {
                track_id: track_id.to_string(),
                position_ms: inner.current_time.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn seek(&self, inner: &mut EngineInner, position: Duration) -> Result<()> {
        let Some(duration) = inner.duration.filter(|_| inner.phase.has_source()) else {
            let err = PlaybackError::SeekFailed("duration unknown".to_string());
            self.report(inner.current_track, &err);
            return Err(err);
        };

        let target = position.min(duration);
        if let Err(e) = self.ctx.output.seek(target).await {
            let err = PlaybackError::SeekFailed(e.to_string());
            self.report(inner.current_track, &err);
            return Err(err);
        }

        inner.current_time = target;
        self.publish(inner);
        if let Some(track_id) = inner.current_track {
            self.emit(PlaybackEvent::PositionChanged {
                track_id: track_id.to_string(),
                position_ms: target.as_millis() as u64,
                duration_ms: Some(duration.as_millis() as u64),
            });
        }
        Ok(())
    }

    /// Auto-advance / skip: next queued track, or stop at the end.
    async fn advance(&self, inner: &mut EngineInner) -> Result<()> {
        match inner.queue.advance().await {
            Some(next) => self.start_track(inner, next).await,
            None => {
                debug!("End of queue");
                self.stop_session(inner).await;
                Ok(())
            }
        }
    }

    fn start_timers(&self, inner: &mut EngineInner) {
        inner.timers.start(
            inner.generation,
            self.config.time_update_interval,
            self.config.end_of_track_poll_interval,
            &self.signals,
        );
    }

    /// Leave the engine stopped and surface `err`.
    async fn fail(&self, inner: &mut EngineInner, track_id: TrackId, err: &PlaybackError) {
        self.release_source(inner).await;
        inner.phase = PlaybackPhase::Stopped;
        inner.current_time = Duration::ZERO;
        inner.streaming = false;
        self.publish(inner);

        error!(track_id = %track_id, error = %err, kind = %err.kind(), "Playback failed");
        self.report(Some(track_id), err);
    }

    fn report(&self, track_id: Option<TrackId>, err: &PlaybackError) {
        let mut context = ErrorContext::new(err.to_string());
        if let Some(id) = track_id {
            context = context.with_track(id.to_string());
        }
        self.ctx.error_sink.report(err.kind(), context);
        self.emit(PlaybackEvent::Error {
            track_id: track_id.map(|id| id.to_string()),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        });
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    async fn handle_signal(&self, signal: EngineSignal) {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        match signal {
            EngineSignal::SourceCompleted { generation } => {
                if generation == inner.generation && inner.phase.has_source() {
                    self.finish_track(inner).await;
                }
            }
            EngineSignal::TimeTick { generation } => {
                if generation != inner.generation || inner.phase != PlaybackPhase::Playing {
                    return;
                }
                if let Ok(position) = self.ctx.output.position().await {
                    inner.current_time = position;
                    self.publish(inner);
                    if let Some(track_id) = inner.current_track {
                        self.emit(PlaybackEvent::PositionChanged {
                            track_id: track_id.to_string(),
                            position_ms: position.as_millis() as u64,
                            duration_ms: inner.duration.map(|d| d.as_millis() as u64),
                        });
                    }
                }
            }
            EngineSignal::EndOfTrackPoll { generation } => {
                if generation != inner.generation || inner.phase != PlaybackPhase::Playing {
                    return;
                }
                let Some(duration) = inner.duration else {
                    return;
                };
                let position = self
                    .ctx
                    .output
                    .position()
                    .await
                    .unwrap_or(inner.current_time);
                if position + self.config.end_of_track_epsilon >= duration {
                    debug!("End of track detected by poll");
                    self.finish_track(inner).await;
                }
            }
            EngineSignal::DownloadFinished {
                generation,
                track_id,
                outcome,
            } => {
                let still_streaming = generation == inner.generation
                    && inner.current_track == Some(track_id)
                    && inner.streaming;
                if !still_streaming {
                    debug!(track_id = %track_id, "Ignoring download for a stale session");
                    return;
                }
                match outcome {
                    DownloadOutcome::Completed | DownloadOutcome::NotScheduled => {
                        self.swap_to_local(inner, track_id).await
                    }
                    other => debug!(track_id = %track_id, outcome = ?other, "Keeping stream"),
                }
            }
        }
    }

    async fn finish_track(&self, inner: &mut EngineInner) {
        if let Some(track_id) = inner.current_track {
            info!(track_id = %track_id, "Track completed");
            self.emit(PlaybackEvent::Completed {
                track_id: track_id.to_string(),
            });
        }
        if let Err(e) = self.advance(inner).await {
            debug!(error = %e, "Auto-advance failed");
        }
    }
}

async fn run_signal_loop(
    engine: Weak<EngineShared>,
    mut signals: mpsc::UnboundedReceiver<EngineSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(shared) = engine.upgrade() else {
            break;
        };
        shared.handle_signal(signal).await;
    }
    debug!("Engine signal loop finished");
}
