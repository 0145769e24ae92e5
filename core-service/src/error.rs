use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Download error: {0}")]
    Download(#[from] core_playback::DownloadError),

    #[error("Queue error: {0}")]
    Queue(#[from] core_playback::QueueError),
}

impl CoreError {
    /// `true` when the host forgot to inject a bridge
    pub fn is_capability_missing(&self) -> bool {
        matches!(
            self,
            CoreError::Runtime(core_runtime::Error::CapabilityMissing { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
