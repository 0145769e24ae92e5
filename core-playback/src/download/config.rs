//! Download scheduler configuration

use bridge_traits::AudioQuality;
use core_runtime::config::PlaybackPreferences;
use std::time::Duration;

/// Configuration for the download scheduler.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Upper bound on concurrent network transfers (default: 3)
    pub max_concurrent_downloads: usize,

    /// Attempts per track before giving up (default: 3)
    pub max_attempts: u32,

    /// Backoff before retry `n` is `retry_base_delay * 2^(n-1)` (default: 1s)
    pub retry_base_delay: Duration,

    /// Timeout for a single attempt (default: 300s)
    pub download_timeout: Duration,

    /// Quality used when a request does not name one
    pub default_quality: AudioQuality,

    /// Read buffer size for streaming payloads (default: 64KB)
    pub chunk_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            download_timeout: Duration::from_secs(300),
            default_quality: AudioQuality::Normal,
            chunk_size: 64 * 1024,
        }
    }
}

impl DownloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the download settings out of the host preferences.
    pub fn from_preferences(prefs: &PlaybackPreferences) -> Self {
        Self {
            max_concurrent_downloads: prefs.max_concurrent_downloads,
            max_attempts: prefs.max_download_attempts,
            retry_base_delay: prefs.retry_base_delay,
            download_timeout: prefs.download_timeout,
            default_quality: prefs.default_quality,
            ..Self::default()
        }
    }

    pub fn with_max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = count;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_default_quality(mut self, quality: AudioQuality) -> Self {
        self.default_quality = quality;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Delay slept after failed attempt `attempt` (1-based).
    ///
    /// Doubles from the base delay: 1s, 2s, 4s, and so on. No delay follows
    /// the final attempt, so the default three attempts only sleep 1s and 2s;
    /// the 4s gap applies once `max_attempts` is raised to four or more.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1u32 << exponent)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_downloads == 0 {
            return Err("max_concurrent_downloads must be at least 1".to_string());
        }

        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }

        if self.download_timeout.is_zero() {
            return Err("download_timeout must be greater than zero".to_string());
        }

        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles() {
        let config = DownloadConfig::new().with_retry_base_delay(Duration::from_secs(1));
        assert_eq!(config.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(0), Duration::from_secs(1));
        // Exponent is capped
        assert_eq!(config.backoff_delay(40), config.backoff_delay(17));
    }

    #[test]
    fn test_validation() {
        assert!(DownloadConfig::new()
            .with_max_concurrent_downloads(0)
            .validate()
            .is_err());
        assert!(DownloadConfig::new().with_max_attempts(0).validate().is_err());
        assert!(DownloadConfig::new()
            .with_download_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_preferences() {
        let prefs = PlaybackPreferences::default()
            .with_max_concurrent_downloads(5)
            .with_default_quality(AudioQuality::High);
        let config = DownloadConfig::from_preferences(&prefs);
        assert_eq!(config.max_concurrent_downloads, 5);
        assert_eq!(config.default_quality, AudioQuality::High);
    }
}
