//! # Download Scheduler
//!
//! Bounded-concurrency worker pool that turns "download this track" requests
//! into retried, progress-reported, cancellable fetch-and-store operations.
//!
//! ## Admission
//!
//! ```text
//! enqueue ──> pending (FIFO) ──[permit]──> worker ──> finish ──> waiters
//!   │ dedup        ▲                         │  ▲
//!   │ by track     └──── admit_pending <─────┘  └── cancel token
//! ```
//!
//! The permit pool holds `max_concurrent_downloads` permits. A worker keeps
//! its permit through every attempt and every backoff sleep, so at most that
//! many tracks are in flight no matter how many are queued. Pending tracks
//! are admitted strictly in enqueue order.
//!
//! ## Per-attempt flow
//!
//! 1. mark the track `downloading`
//! 2. use the pre-resolved stream if one was supplied and is still valid,
//!    otherwise ask the [`StreamResolver`]
//! 3. stream bytes from the [`HttpClient`], updating progress as they arrive
//! 4. store the payload under [`TrackId::storage_key`] and mark the track
//!    `downloaded`
//!
//! Retryable failures back off `retry_base_delay * 2^(attempt-1)` before the
//! next attempt. The terminal failure is reported to the [`ErrorSink`]
//! exactly once.
//!
//! ## Cancellation
//!
//! Each task owns a [`CancellationToken`]. The worker races its whole retry
//! loop against the token, so a cancel interrupts a network read or a
//! backoff sleep immediately. Partial payloads are dropped and the track
//! reverts to `not_downloaded`.

use crate::download::config::DownloadConfig;
use crate::download::progress::{DownloadProgress, SchedulerStats, TaskPhase};
use crate::error::{DownloadError, DownloadResult};
use async_trait::async_trait;
use bridge_traits::{
    AudioQuality, DownloadStream, ErrorContext, ErrorKind, ErrorSink, HttpClient, ResolvedStream,
    StorageGateway, StreamResolver,
};
use bytes::BytesMut;
use chrono::Utc;
use core_library::{ActiveDownloadGuard, Track, TrackId, TrackRepository};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::redact_url;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Progress is reported every this many bytes when the length is unknown.
const UNKNOWN_LENGTH_REPORT_STEP: u64 = 256 * 1024;

/// Progress events per attempt when the length is known.
const REPORTS_PER_ATTEMPT: u64 = 20;

/// Upper bound on the up-front payload buffer allocation.
const MAX_PREALLOC_BYTES: u64 = 16 * 1024 * 1024;

// ============================================================================
// Requests & Outcomes
// ============================================================================

/// A request to download one track.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub track_id: TrackId,
    /// Falls back to [`DownloadConfig::default_quality`]
    pub quality: Option<AudioQuality>,
    /// Stream already resolved by the caller, used by the first attempt
    pub resolved: Option<ResolvedStream>,
    /// Re-fetch even if the track is already downloaded
    pub force: bool,
}

impl DownloadRequest {
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            quality: None,
            resolved: None,
            force: false,
        }
    }

    pub fn with_quality(mut self, quality: AudioQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_resolved_stream(mut self, resolved: ResolvedStream) -> Self {
        self.resolved = Some(resolved);
        self
    }

    /// Overwrite an existing payload.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Result of admitting a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new task was created.
    Accepted,
    /// The track already has a pending or active task; nothing changed.
    AlreadyPending,
    /// The track is downloaded and the request was not forced.
    AlreadyDownloaded,
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EnqueueOutcome::Accepted)
    }

    /// Treat a duplicate request as an error.
    pub fn into_result(self, track_id: &TrackId) -> DownloadResult<()> {
        match self {
            EnqueueOutcome::AlreadyPending => {
                Err(DownloadError::AlreadyDownloading(track_id.to_string()))
            }
            EnqueueOutcome::Accepted | EnqueueOutcome::AlreadyDownloaded => Ok(()),
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    NotFound,
}

/// Terminal state of a scheduled download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed,
    Failed { kind: ErrorKind, message: String },
    Cancelled,
    /// The scheduler had no task for the track.
    NotScheduled,
}

impl DownloadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DownloadOutcome::Completed)
    }
}

/// Handle returned by [`DownloadScheduler::submit`].
///
/// The completion listener is registered atomically with admission, so the
/// outcome cannot be missed even if the transfer finishes immediately.
#[derive(Debug)]
pub struct DownloadTicket {
    pub outcome: EnqueueOutcome,
    completion: Option<oneshot::Receiver<DownloadOutcome>>,
}

impl DownloadTicket {
    /// Wait until the track reaches a terminal state.
    pub async fn wait(self) -> DownloadOutcome {
        match (self.outcome, self.completion) {
            (EnqueueOutcome::AlreadyDownloaded, _) => DownloadOutcome::Completed,
            (_, Some(rx)) => rx.await.unwrap_or(DownloadOutcome::Cancelled),
            (_, None) => DownloadOutcome::NotScheduled,
        }
    }
}

/// Aggregate result of [`DownloadScheduler::redownload_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

// ============================================================================
// Scheduler State
// ============================================================================

/// One track's task, from admission until its terminal state.
struct DownloadTask {
    request: DownloadRequest,
    progress: DownloadProgress,
    cancel: CancellationToken,
    waiters: Vec<oneshot::Sender<DownloadOutcome>>,
}

impl DownloadTask {
    fn resolve(self, outcome: &DownloadOutcome) {
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Everything shared across workers, behind one lock.
#[derive(Default)]
struct SchedulerState {
    /// Admission order of tasks waiting for a permit
    pending: VecDeque<TrackId>,
    /// Pending and in-flight tasks
    tasks: HashMap<TrackId, DownloadTask>,
    closed: bool,
}

struct SchedulerInner {
    config: DownloadConfig,
    tracks: Arc<dyn TrackRepository>,
    resolver: Arc<dyn StreamResolver>,
    http_client: Arc<dyn HttpClient>,
    storage: Arc<dyn StorageGateway>,
    error_sink: Arc<dyn ErrorSink>,
    event_bus: EventBus,
    permits: Arc<Semaphore>,
    state: Mutex<SchedulerState>,
    shutdown: CancellationToken,
}

// ============================================================================
// Public API
// ============================================================================

/// Download scheduler. Cheap to clone; clones share one worker pool.
#[derive(Clone)]
pub struct DownloadScheduler {
    inner: Arc<SchedulerInner>,
}

impl DownloadScheduler {
    /// Create a scheduler.
    ///
    /// # Arguments
    ///
    /// * `config` - Concurrency, retry and timeout settings
    /// * `tracks` - Track records; the scheduler is the only writer of their download fields
    /// * `resolver` - Turns a track's source reference into an audio URL
    /// * `http_client` - Streams the payload
    /// * `storage` - Persists the payload
    /// * `error_sink` - Receives terminal failures
    /// * `event_bus` - Receives [`DownloadEvent`]s
    pub fn new(
        config: DownloadConfig,
        tracks: Arc<dyn TrackRepository>,
        resolver: Arc<dyn StreamResolver>,
        http_client: Arc<dyn HttpClient>,
        storage: Arc<dyn StorageGateway>,
        error_sink: Arc<dyn ErrorSink>,
        event_bus: EventBus,
    ) -> Self {
        // A zero-permit pool would never admit anything
        let permits = Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1)));

        Self {
            inner: Arc::new(SchedulerInner {
                config,
                tracks,
                resolver,
                http_client,
                storage,
                error_sink,
                event_bus,
                permits,
                state: Mutex::new(SchedulerState::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.inner.config
    }

    /// Admit a track for download.
    ///
    /// Duplicate requests for a pending or active track return
    /// [`EnqueueOutcome::AlreadyPending`] without touching the existing task.
    ///
    /// # Errors
    /// - [`DownloadError::TrackNotFound`] if there is no such track
    /// - [`DownloadError::InvalidSource`] if the track has no source reference
    ///   and no pre-resolved stream was supplied
    /// - [`DownloadError::SchedulerClosed`] after [`shutdown`](Self::shutdown)
    pub async fn enqueue(&self, request: DownloadRequest) -> DownloadResult<EnqueueOutcome> {
        Ok(self.submit(request).await?.outcome)
    }

    /// Like [`enqueue`](Self::enqueue), also returning a completion ticket.
    #[instrument(skip(self, request), fields(track_id = %request.track_id, force = request.force))]
    pub async fn submit(&self, request: DownloadRequest) -> DownloadResult<DownloadTicket> {
        let inner = &self.inner;
        let track_id = request.track_id;

        if let Some(ticket) = inner.join_existing(&track_id)? {
            debug!("Track already scheduled");
            return Ok(ticket);
        }

        let mut track = inner.load_track(&track_id).await?;
        if track.is_downloaded() && !request.force {
            debug!("Track already downloaded");
            return Ok(DownloadTicket {
                outcome: EnqueueOutcome::AlreadyDownloaded,
                completion: None,
            });
        }

        if track.source_ref.is_none() && request.resolved.is_none() {
            let err = DownloadError::InvalidSource(format!("track {} has no source", track_id));
            warn!(error = %err, "Rejecting download");
            inner.error_sink.report(
                err.kind(),
                ErrorContext::new(err.to_string()).with_track(track_id.to_string()),
            );
            return Err(err);
        }

        // Claim the slot first; only the accepted submit writes the record
        let (tx, rx) = oneshot::channel();
        {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(DownloadError::SchedulerClosed);
            }
            if let Some(existing) = state.tasks.get_mut(&track_id) {
                existing.waiters.push(tx);
                return Ok(DownloadTicket {
                    outcome: EnqueueOutcome::AlreadyPending,
                    completion: Some(rx),
                });
            }
            state.tasks.insert(
                track_id,
                DownloadTask {
                    request,
                    progress: DownloadProgress::new(track_id),
                    cancel: inner.shutdown.child_token(),
                    waiters: vec![tx],
                },
            );
        }

        track.mark_queued();
        if let Err(e) = inner.tracks.update(&track).await {
            inner.state.lock().tasks.remove(&track_id);
            return Err(e.into());
        }

        let (still_scheduled, closed_out) = {
            let mut state = inner.state.lock();
            if state.closed {
                (false, state.tasks.remove(&track_id))
            } else if state.tasks.contains_key(&track_id) {
                state.pending.push_back(track_id);
                (true, None)
            } else {
                (false, None)
            }
        };
        if let Some(task) = closed_out {
            // Shut down mid-submit; the record stays queued for the next session
            task.resolve(&DownloadOutcome::Cancelled);
        } else if !still_scheduled {
            // Cancelled between claiming the slot and writing the record
            inner.discard(&track_id).await;
        }
        if !still_scheduled {
            return Ok(DownloadTicket {
                outcome: EnqueueOutcome::Accepted,
                completion: Some(rx),
            });
        }

        info!("Download queued");
        inner.emit(DownloadEvent::Queued {
            track_id: track_id.to_string(),
        });
        admit_pending(inner);

        Ok(DownloadTicket {
            outcome: EnqueueOutcome::Accepted,
            completion: Some(rx),
        })
    }

    /// Cancel a pending or active download.
    ///
    /// An active transfer or backoff sleep is interrupted, the partial payload
    /// is discarded and the track reverts to `not_downloaded`. Cancelling a
    /// task that is already being cancelled is a no-op.
    #[instrument(skip(self), fields(track_id = %track_id))]
    pub async fn cancel(&self, track_id: &TrackId) -> DownloadResult<CancelOutcome> {
        let inner = &self.inner;
        let removed = {
            let mut state = inner.state.lock();
            let Some(phase) = state.tasks.get(track_id).map(|t| t.progress.phase) else {
                return Ok(CancelOutcome::NotFound);
            };

            if phase == TaskPhase::Pending {
                state.pending.retain(|id| id != track_id);
                state.tasks.remove(track_id)
            } else {
                if let Some(task) = state.tasks.get(track_id) {
                    task.cancel.cancel();
                }
                None
            }
        };

        // Pending tasks have no worker to unwind them
        if let Some(task) = removed {
            inner.discard(track_id).await;
            info!("Pending download cancelled");
            inner.emit(DownloadEvent::Cancelled {
                track_id: track_id.to_string(),
            });
            task.resolve(&DownloadOutcome::Cancelled);
        } else {
            debug!("Cancellation signalled to worker");
        }

        Ok(CancelOutcome::Cancelled)
    }

    /// Cancel and return once no worker can still write the track's payload.
    pub async fn cancel_and_wait(&self, track_id: &TrackId) {
        let completion = self.wait_for(track_id);
        if let Err(e) = self.cancel(track_id).await {
            warn!(track_id = %track_id, error = %e, "Cancel failed");
        }
        completion.await;
    }

    /// Future resolving once the track reaches a terminal state.
    ///
    /// The listener is registered when this is called, not when the future
    /// is first polled. Resolves to [`DownloadOutcome::NotScheduled`] if the
    /// track has no pending or active task.
    pub fn wait_for(
        &self,
        track_id: &TrackId,
    ) -> impl std::future::Future<Output = DownloadOutcome> + Send + 'static {
        let receiver = {
            let mut state = self.inner.state.lock();
            state.tasks.get_mut(track_id).map(|task| {
                let (tx, rx) = oneshot::channel();
                task.waiters.push(tx);
                rx
            })
        };

        async move {
            match receiver {
                Some(rx) => rx.await.unwrap_or(DownloadOutcome::Cancelled),
                None => DownloadOutcome::NotScheduled,
            }
        }
    }

    /// Progress fraction of a scheduled track, `0.0` if unknown.
    pub fn progress(&self, track_id: &TrackId) -> f64 {
        self.inner
            .state
            .lock()
            .tasks
            .get(track_id)
            .map_or(0.0, |task| task.progress.fraction)
    }

    pub fn progress_snapshot(&self, track_id: &TrackId) -> Option<DownloadProgress> {
        self.inner
            .state
            .lock()
            .tasks
            .get(track_id)
            .map(|task| task.progress.clone())
    }

    /// Snapshots of every task currently holding a permit.
    pub fn active_downloads(&self) -> Vec<DownloadProgress> {
        self.inner
            .state
            .lock()
            .tasks
            .values()
            .filter(|task| matches!(task.progress.phase, TaskPhase::Active | TaskPhase::Retrying))
            .map(|task| task.progress.clone())
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state.lock();
        let mut stats = SchedulerStats::default();
        for task in state.tasks.values() {
            match task.progress.phase {
                TaskPhase::Pending => stats.queued += 1,
                TaskPhase::Active => stats.active += 1,
                TaskPhase::Retrying => stats.retrying += 1,
                _ => {}
            }
        }
        stats
    }

    pub fn is_scheduled(&self, track_id: &TrackId) -> bool {
        self.inner.state.lock().tasks.contains_key(track_id)
    }

    /// Re-fetch every listed track at `quality`, overwriting stored payloads.
    ///
    /// Emits [`DownloadEvent::BatchProgress`] as tracks finish and returns
    /// once all of them reached a terminal state.
    #[instrument(skip(self, track_ids), fields(total = track_ids.len(), quality = ?quality))]
    pub async fn redownload_all(&self, quality: AudioQuality, track_ids: &[TrackId]) -> BatchSummary {
        let mut summary = BatchSummary {
            total: track_ids.len(),
            ..BatchSummary::default()
        };
        let mut completions = FuturesUnordered::new();

        for track_id in track_ids {
            let request = DownloadRequest::new(*track_id)
                .with_quality(quality)
                .forced();
            match self.submit(request).await {
                Ok(ticket) => completions.push(ticket.wait()),
                Err(e) => {
                    warn!(track_id = %track_id, error = %e, "Re-download rejected");
                    summary.failed += 1;
                }
            }
        }

        if summary.failed > 0 {
            self.inner.emit_batch(&summary);
        }

        while let Some(outcome) = completions.next().await {
            if outcome.is_completed() {
                summary.completed += 1;
            } else {
                summary.failed += 1;
            }
            self.inner.emit_batch(&summary);
        }

        info!(
            completed = summary.completed,
            failed = summary.failed,
            "Re-download finished"
        );
        summary
    }

    /// Cancel any transfer, then delete the stored payload and reset the
    /// track to `not_downloaded`.
    #[instrument(skip(self), fields(track_id = %track_id))]
    pub async fn remove_download(&self, track_id: &TrackId) -> DownloadResult<()> {
        self.cancel_and_wait(track_id).await;

        let mut track = self.inner.load_track(track_id).await?;
        let key = track
            .local_key
            .clone()
            .unwrap_or_else(|| track_id.storage_key());
        self.inner
            .storage
            .delete(&key)
            .await
            .map_err(DownloadError::storage)?;

        track.reset_download();
        self.inner.tracks.update(&track).await?;
        info!("Download removed");
        Ok(())
    }

    /// Re-admit tracks left `queued` or `downloading` by a previous session.
    #[instrument(skip(self))]
    pub async fn resume_interrupted(&self) -> DownloadResult<usize> {
        let mut interrupted = self
            .inner
            .tracks
            .find_by_download_state(core_library::DownloadState::Queued)
            .await?;
        interrupted.extend(
            self.inner
                .tracks
                .find_by_download_state(core_library::DownloadState::Downloading)
                .await?,
        );

        let mut resumed = 0;
        for track in interrupted {
            match self.enqueue(DownloadRequest::new(track.id)).await {
                Ok(EnqueueOutcome::Accepted) => resumed += 1,
                Ok(_) => {}
                Err(e) => warn!(track_id = %track.id, error = %e, "Could not resume download"),
            }
        }

        if resumed > 0 {
            info!(resumed, "Resumed interrupted downloads");
        }
        Ok(resumed)
    }

    /// Stop admitting work and cancel every task.
    ///
    /// Pending tracks keep their `queued` state so
    /// [`resume_interrupted`](Self::resume_interrupted) can pick them up later.
    pub fn shutdown(&self) {
        let drained: Vec<DownloadTask> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let pending: Vec<TrackId> = state.pending.drain(..).collect();
            pending
                .iter()
                .filter_map(|id| state.tasks.remove(id))
                .collect()
        };

        self.inner.shutdown.cancel();
        info!(dropped_pending = drained.len(), "Download scheduler shut down");

        for task in drained {
            task.resolve(&DownloadOutcome::Cancelled);
        }
    }
}

#[async_trait]
impl ActiveDownloadGuard for DownloadScheduler {
    async fn cancel_and_wait(&self, track_id: &TrackId) {
        DownloadScheduler::cancel_and_wait(self, track_id).await;
    }
}

// ============================================================================
// Workers
// ============================================================================

/// Hand free permits to pending tasks in FIFO order.
///
/// Permit acquisition and dequeueing happen under the state lock, and workers
/// release their permit before calling this, so a pending task can never be
/// stranded while a permit is free.
fn admit_pending(inner: &Arc<SchedulerInner>) {
    let mut state = inner.state.lock();
    if state.closed {
        return;
    }

    while !state.pending.is_empty() {
        let Ok(permit) = inner.permits.clone().try_acquire_owned() else {
            break;
        };
        let Some(track_id) = state.pending.pop_front() else {
            break;
        };
        let Some(task) = state.tasks.get_mut(&track_id) else {
            continue;
        };

        task.progress.phase = TaskPhase::Active;
        let request = task.request.clone();
        let cancel = task.cancel.clone();
        debug!(track_id = %track_id, "Download admitted");

        tokio::spawn(Arc::clone(inner).run_worker(request, cancel, permit));
    }
}

impl SchedulerInner {
    async fn run_worker(
        self: Arc<Self>,
        request: DownloadRequest,
        cancel: CancellationToken,
        permit: OwnedSemaphorePermit,
    ) {
        let track_id = request.track_id;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = self.download_with_retry(&request) => result,
        };

        self.finish(&track_id, result).await;
        drop(permit);
        admit_pending(&self);
    }

    /// Run attempts until one succeeds, a non-retryable error occurs, or
    /// attempts are exhausted.
    async fn download_with_retry(&self, request: &DownloadRequest) -> DownloadResult<u64> {
        let track_id = request.track_id;
        let quality = request.quality.unwrap_or(self.config.default_quality);
        let max_attempts = self.config.max_attempts.max(1);
        let mut prefetched = request.resolved.clone();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.with_task(&track_id, |task| task.progress.begin_attempt(attempt, None));
            self.emit(DownloadEvent::Started {
                track_id: track_id.to_string(),
                attempt,
            });
            debug!(track_id = %track_id, attempt, max_attempts, "Download attempt");

            let result = match timeout(
                self.config.download_timeout,
                self.attempt(&track_id, quality, prefetched.take()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DownloadError::NetworkFailed(format!(
                    "attempt timed out after {}s",
                    self.config.download_timeout.as_secs()
                ))),
            };

            let err = match result {
                Ok(bytes) => return Ok(bytes),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempt < max_attempts {
                let delay = self.config.backoff_delay(attempt);
                warn!(
                    track_id = %track_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Download attempt failed, retrying"
                );
                self.with_task(&track_id, |task| task.progress.phase = TaskPhase::Retrying);
                self.emit(DownloadEvent::Retrying {
                    track_id: track_id.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: err.to_string(),
                });
                sleep(delay).await;
            } else {
                warn!(track_id = %track_id, attempt, error = %err, "Final download attempt failed");
            }
            last_error = Some(err);
        }

        Err(DownloadError::MaxRetriesExceeded {
            attempts: max_attempts,
            last: Box::new(last_error.unwrap_or_else(|| {
                DownloadError::NetworkFailed("no attempt completed".to_string())
            })),
        })
    }

    /// One resolve-fetch-store pass.
    async fn attempt(
        &self,
        track_id: &TrackId,
        quality: AudioQuality,
        prefetched: Option<ResolvedStream>,
    ) -> DownloadResult<u64> {
        let mut track = self.load_track(track_id).await?;
        track.mark_downloading();
        self.tracks.update(&track).await?;

        let audio_url = match prefetched.filter(|s| !s.is_expired_at(Utc::now())) {
            Some(resolved) => resolved.audio_url,
            None => self.resolve(&track, quality).await?,
        };
        debug!(track_id = %track_id, url = %redact_url(&audio_url), "Fetching payload");

        let DownloadStream {
            content_length,
            mut body,
        } = self
            .http_client
            .download_stream(&audio_url)
            .await
            .map_err(DownloadError::network)?;
        self.with_task(track_id, |task| task.progress.set_total_bytes(content_length));

        let capacity = content_length.unwrap_or(0).min(MAX_PREALLOC_BYTES) as usize;
        let mut payload = BytesMut::with_capacity(capacity);
        let mut chunk = vec![0u8; self.config.chunk_size.max(1)];
        let report_step = content_length
            .map(|total| (total / REPORTS_PER_ATTEMPT).max(1))
            .unwrap_or(UNKNOWN_LENGTH_REPORT_STEP);
        let mut next_report = report_step;

        loop {
            let read = body.read(&mut chunk).await.map_err(DownloadError::network)?;
            if read == 0 {
                break;
            }
            payload.extend_from_slice(&chunk[..read]);

            let downloaded = payload.len() as u64;
            let fraction = self
                .with_task(track_id, |task| {
                    task.progress.update(downloaded);
                    task.progress.fraction
                })
                .unwrap_or_default();

            if downloaded >= next_report {
                next_report = downloaded + report_step;
                self.emit(DownloadEvent::Progress {
                    track_id: track_id.to_string(),
                    fraction,
                    downloaded_bytes: downloaded,
                    total_bytes: content_length,
                });
                track.set_progress(fraction);
                self.tracks.update(&track).await?;
            }
        }

        let size = payload.len() as u64;
        if let Some(expected) = content_length {
            if size != expected {
                return Err(DownloadError::NetworkFailed(format!(
                    "transfer ended after {} of {} bytes",
                    size, expected
                )));
            }
        }

        let key = self
            .storage
            .save(&track_id.storage_key(), payload.freeze())
            .await
            .map_err(DownloadError::storage)?;

        let mut track = self.load_track(track_id).await?;
        track.mark_downloaded(key, size, quality);
        self.tracks.update(&track).await?;

        Ok(size)
    }

    async fn resolve(&self, track: &Track, quality: AudioQuality) -> DownloadResult<String> {
        let source_ref = track
            .source_ref
            .as_deref()
            .ok_or_else(|| DownloadError::InvalidSource(format!("track {} has no source", track.id)))?;

        let resolved = self
            .resolver
            .resolve(source_ref, quality)
            .await
            .map_err(DownloadError::resolution)?;
        Ok(resolved.audio_url)
    }

    /// Record the terminal state and wake waiters.
    async fn finish(&self, track_id: &TrackId, result: DownloadResult<u64>) {
        let outcome = match result {
            Ok(bytes) => {
                info!(track_id = %track_id, bytes, "Download completed");
                self.emit(DownloadEvent::Completed {
                    track_id: track_id.to_string(),
                    bytes,
                });
                DownloadOutcome::Completed
            }
            Err(DownloadError::Cancelled) => {
                self.discard(track_id).await;
                info!(track_id = %track_id, "Download cancelled");
                self.emit(DownloadEvent::Cancelled {
                    track_id: track_id.to_string(),
                });
                DownloadOutcome::Cancelled
            }
            Err(err) => {
                self.fail(track_id, &err).await;
                DownloadOutcome::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        };

        let task = self.state.lock().tasks.remove(track_id);
        if let Some(task) = task {
            task.resolve(&outcome);
        }
    }

    /// Drop any stored bytes and revert the record to `not_downloaded`.
    async fn discard(&self, track_id: &TrackId) {
        if let Err(e) = self.storage.delete(&track_id.storage_key()).await {
            warn!(track_id = %track_id, error = %e, "Failed to discard partial payload");
        }

        match self.tracks.find_by_id(track_id).await {
            Ok(Some(mut track)) => {
                track.reset_download();
                if let Err(e) = self.tracks.update(&track).await {
                    warn!(track_id = %track_id, error = %e, "Failed to reset track state");
                }
            }
            Ok(None) => debug!(track_id = %track_id, "Track record gone"),
            Err(e) => warn!(track_id = %track_id, error = %e, "Failed to load track"),
        }
    }

    /// Mark the track failed and report the terminal error once.
    async fn fail(&self, track_id: &TrackId, err: &DownloadError) {
        let attempts = match err {
            DownloadError::MaxRetriesExceeded { attempts, .. } => *attempts,
            _ => self
                .with_task(track_id, |task| task.progress.attempt)
                .unwrap_or(1),
        };
        error!(track_id = %track_id, attempts, error = %err, "Download failed");

        if let Err(e) = self.storage.delete(&track_id.storage_key()).await {
            debug!(track_id = %track_id, error = %e, "No payload to discard");
        }

        match self.tracks.find_by_id(track_id).await {
            Ok(Some(mut track)) => {
                track.mark_failed();
                if let Err(e) = self.tracks.update(&track).await {
                    warn!(track_id = %track_id, error = %e, "Failed to persist failed state");
                }
            }
            Ok(None) => debug!(track_id = %track_id, "Track record gone"),
            Err(e) => warn!(track_id = %track_id, error = %e, "Failed to load track"),
        }

        self.error_sink.report(
            err.kind(),
            ErrorContext::new(err.to_string())
                .with_track(track_id.to_string())
                .with_attempts(attempts)
                .with_cause(err.root_kind()),
        );
        self.emit(DownloadEvent::Failed {
            track_id: track_id.to_string(),
            attempts,
            reason: err.to_string(),
        });
    }

    /// Ticket for a track that already has a task, registering a listener.
    fn join_existing(&self, track_id: &TrackId) -> DownloadResult<Option<DownloadTicket>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DownloadError::SchedulerClosed);
        }
        Ok(state.tasks.get_mut(track_id).map(|task| {
            let (tx, rx) = oneshot::channel();
            task.waiters.push(tx);
            DownloadTicket {
                outcome: EnqueueOutcome::AlreadyPending,
                completion: Some(rx),
            }
        }))
    }

    async fn load_track(&self, track_id: &TrackId) -> DownloadResult<Track> {
        self.tracks
            .find_by_id(track_id)
            .await?
            .ok_or_else(|| DownloadError::TrackNotFound(track_id.to_string()))
    }

    fn with_task<R>(&self, track_id: &TrackId, f: impl FnOnce(&mut DownloadTask) -> R) -> Option<R> {
        self.state.lock().tasks.get_mut(track_id).map(f)
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.event_bus.emit(CoreEvent::Download(event));
    }

    fn emit_batch(&self, summary: &BatchSummary) {
        self.emit(DownloadEvent::BatchProgress {
            completed: summary.completed,
            failed: summary.failed,
            total: summary.total,
        });
    }
}
