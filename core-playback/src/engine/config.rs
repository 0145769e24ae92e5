//! Playback engine configuration

use bridge_traits::AudioQuality;
use core_runtime::config::PlaybackPreferences;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of position updates while playing (default: 250ms)
    pub time_update_interval: Duration,

    /// Period of the end-of-track safety poll (default: 500ms)
    pub end_of_track_poll_interval: Duration,

    /// The poll treats `position >= duration - epsilon` as finished (default: 250ms)
    pub end_of_track_epsilon: Duration,

    /// Quality requested when streaming and for the background download
    pub streaming_quality: AudioQuality,

    /// Download streamed tracks in the background when policy allows (default: true)
    pub download_while_streaming: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_update_interval: Duration::from_millis(250),
            end_of_track_poll_interval: Duration::from_millis(500),
            end_of_track_epsilon: Duration::from_millis(250),
            streaming_quality: AudioQuality::Normal,
            download_while_streaming: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_preferences(prefs: &PlaybackPreferences) -> Self {
        Self {
            time_update_interval: prefs.time_update_interval,
            end_of_track_poll_interval: prefs.end_of_track_poll_interval,
            end_of_track_epsilon: prefs.end_of_track_epsilon,
            streaming_quality: prefs.default_quality,
            ..Self::default()
        }
    }

    pub fn with_time_update_interval(mut self, interval: Duration) -> Self {
        self.time_update_interval = interval;
        self
    }

    pub fn with_end_of_track_poll_interval(mut self, interval: Duration) -> Self {
        self.end_of_track_poll_interval = interval;
        self
    }

    pub fn with_end_of_track_epsilon(mut self, epsilon: Duration) -> Self {
        self.end_of_track_epsilon = epsilon;
        self
    }

    pub fn with_streaming_quality(mut self, quality: AudioQuality) -> Self {
        self.streaming_quality = quality;
        self
    }

    pub fn with_download_while_streaming(mut self, enabled: bool) -> Self {
        self.download_while_streaming = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.time_update_interval.is_zero() {
            return Err("time_update_interval must be greater than zero".to_string());
        }
        if self.end_of_track_poll_interval.is_zero() {
            return Err("end_of_track_poll_interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.download_while_streaming);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(EngineConfig::new()
            .with_time_update_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(EngineConfig::new()
            .with_end_of_track_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_preferences() {
        let prefs = PlaybackPreferences::default()
            .with_time_update_interval(Duration::from_millis(100))
            .with_default_quality(AudioQuality::Low);
        let config = EngineConfig::from_preferences(&prefs);
        assert_eq!(config.time_update_interval, Duration::from_millis(100));
        assert_eq!(config.streaming_quality, AudioQuality::Low);
    }
}
