//! Stream Resolution
//!
//! Maps an opaque track source reference to a playable, time-limited audio
//! URL. How the URL is obtained is the resolver's business; the core only
//! relies on the request/response contract below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Requested audio quality for streaming and downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    #[default]
    Normal,
    High,
}

impl AudioQuality {
    /// Nominal bitrate in kbps the resolver should aim for.
    pub fn nominal_bitrate_kbps(&self) -> u32 {
        match self {
            AudioQuality::Low => 64,
            AudioQuality::Normal => 128,
            AudioQuality::High => 256,
        }
    }
}

/// A resolved, playable audio URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    /// Direct audio URL (often signed; never log it unredacted)
    pub audio_url: String,
    /// Instant after which the URL stops working
    pub expires_at: DateTime<Utc>,
}

impl ResolvedStream {
    pub fn new(audio_url: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            audio_url: audio_url.into(),
            expires_at,
        }
    }

    /// Whether the URL is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Stream resolver trait
///
/// A single async call: succeed with a [`ResolvedStream`] or fail. Failures
/// are treated as attempt failures by the download scheduler and as
/// streaming failures by the playback engine.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve `source_ref` into an audio URL at the requested quality
    async fn resolve(&self, source_ref: &str, quality: AudioQuality) -> Result<ResolvedStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let stream = ResolvedStream::new("https://cdn/a", now + Duration::minutes(5));

        assert!(!stream.is_expired_at(now));
        assert!(stream.is_expired_at(now + Duration::minutes(5)));
    }

    #[test]
    fn test_quality_ordering_of_bitrates() {
        assert!(AudioQuality::Low.nominal_bitrate_kbps() < AudioQuality::Normal.nominal_bitrate_kbps());
        assert!(AudioQuality::Normal.nominal_bitrate_kbps() < AudioQuality::High.nominal_bitrate_kbps());
        assert_eq!(AudioQuality::default(), AudioQuality::Normal);
    }
}
