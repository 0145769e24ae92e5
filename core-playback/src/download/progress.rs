//! Download progress snapshots and scheduler statistics

use core_library::models::MAX_IN_FLIGHT_PROGRESS;
use core_library::TrackId;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Scheduler-internal lifecycle of one download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Pending,
    Active,
    /// Sleeping between attempts; still holds its permit.
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskPhase::Succeeded | TaskPhase::Failed | TaskPhase::Cancelled
        )
    }
}

/// Read-only progress of one track's download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub track_id: TrackId,

    pub phase: TaskPhase,

    /// Current attempt, `0` while still pending
    pub attempt: u32,

    /// Payload size when the server reported one
    pub total_bytes: Option<u64>,

    /// Bytes received by the current attempt
    pub downloaded_bytes: u64,

    /// Fraction in `[0, 0.99]` while in flight
    pub fraction: f64,

    /// Average speed of the current attempt in bytes/second
    pub speed_bytes_per_sec: u64,

    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,

    attempt_started: Instant,
}

impl DownloadProgress {
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            phase: TaskPhase::Pending,
            attempt: 0,
            total_bytes: None,
            downloaded_bytes: 0,
            fraction: 0.0,
            speed_bytes_per_sec: 0,
            eta_seconds: None,
            attempt_started: Instant::now(),
        }
    }

    /// Reset byte counters for a fresh attempt.
    pub fn begin_attempt(&mut self, attempt: u32, total_bytes: Option<u64>) {
        self.phase = TaskPhase::Active;
        self.attempt = attempt;
        self.total_bytes = total_bytes;
        self.downloaded_bytes = 0;
        self.fraction = 0.0;
        self.speed_bytes_per_sec = 0;
        self.eta_seconds = None;
        self.attempt_started = Instant::now();
    }

    /// Record the payload size once the transfer reports it.
    pub fn set_total_bytes(&mut self, total_bytes: Option<u64>) {
        self.total_bytes = total_bytes;
    }

    /// Update progress with the running byte count of the current attempt.
    pub fn update(&mut self, downloaded_bytes: u64) {
        self.downloaded_bytes = downloaded_bytes;

        if let Some(total) = self.total_bytes.filter(|t| *t > 0) {
            let fraction = downloaded_bytes as f64 / total as f64;
            self.fraction = fraction.min(MAX_IN_FLIGHT_PROGRESS);
        }

        let elapsed_ms = self.attempt_started.elapsed().as_millis().max(1) as u64;
        self.speed_bytes_per_sec = downloaded_bytes.saturating_mul(1000) / elapsed_ms;

        self.eta_seconds = match (self.total_bytes, self.speed_bytes_per_sec) {
            (Some(total), speed) if speed > 0 => {
                Some(total.saturating_sub(downloaded_bytes) / speed)
            }
            _ => None,
        };
    }

    /// Format speed as human-readable string.
    pub fn speed_string(&self) -> String {
        format_bytes_per_sec(self.speed_bytes_per_sec)
    }
}

/// Counts of tasks the scheduler currently tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Admitted but waiting for a permit
    pub queued: usize,
    /// Transferring
    pub active: usize,
    /// Backing off between attempts
    pub retrying: usize,
}

impl SchedulerStats {
    /// Tasks holding a permit.
    pub fn in_flight(&self) -> usize {
        self.active + self.retrying
    }

    pub fn total(&self) -> usize {
        self.queued + self.in_flight()
    }
}

fn format_bytes_per_sec(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B/s", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB/s", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB/s", bytes as f64 / (1024.0 * 1024.0))
    }
}
