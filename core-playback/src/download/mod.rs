//! Background downloads of track payloads
//!
//! See [`scheduler`] for the admission, retry and cancellation model.

pub mod config;
pub mod progress;
pub mod scheduler;

pub use config::DownloadConfig;
pub use progress::{DownloadProgress, SchedulerStats, TaskPhase};
pub use scheduler::{
    BatchSummary, CancelOutcome, DownloadOutcome, DownloadRequest, DownloadScheduler,
    DownloadTicket, EnqueueOutcome,
};
