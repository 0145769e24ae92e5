//! Builder validation without desktop defaults

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioOutput, AudioQuality, AudioSource, CompletionNotifier, ResolvedStream, StreamResolver,
};
use core_runtime::config::{CoreConfig, PlaybackPreferences};
use core_runtime::Error;
use std::sync::Arc;
use std::time::Duration;

struct NullResolver;

#[async_trait]
impl StreamResolver for NullResolver {
    async fn resolve(&self, source_ref: &str, _quality: AudioQuality) -> BridgeResult<ResolvedStream> {
        Ok(ResolvedStream::new(
            format!("https://cdn.example/{}", source_ref),
            chrono::Utc::now(),
        ))
    }
}

struct NullOutput;

#[async_trait]
impl AudioOutput for NullOutput {
    async fn load(
        &self,
        _source: AudioSource,
        _start_at: Duration,
        _on_complete: CompletionNotifier,
    ) -> BridgeResult<Option<Duration>> {
        Ok(None)
    }

    async fn swap_source(
        &self,
        _source: AudioSource,
        _position: Duration,
        _on_complete: CompletionNotifier,
    ) -> BridgeResult<()> {
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn seek(&self, _position: Duration) -> BridgeResult<()> {
        Ok(())
    }

    async fn position(&self) -> BridgeResult<Duration> {
        Ok(Duration::ZERO)
    }
}

#[cfg(not(feature = "desktop-shims"))]
#[test]
fn test_missing_http_client_without_shims() {
    let err = CoreConfig::builder()
        .data_dir("/tmp/waveline-test")
        .stream_resolver(Arc::new(NullResolver))
        .audio_output(Arc::new(NullOutput))
        .build()
        .unwrap_err();

    match err {
        Error::CapabilityMissing { capability, message } => {
            assert_eq!(capability, "HttpClient");
            assert!(message.contains("desktop-shims"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_audio_output_reported_before_defaults() {
    let err = CoreConfig::builder()
        .data_dir("/tmp/waveline-test")
        .stream_resolver(Arc::new(NullResolver))
        .build()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::CapabilityMissing { ref capability, .. } if capability == "AudioOutput"
    ));
}

#[test]
fn test_invalid_preferences_rejected() {
    let prefs = PlaybackPreferences::default().with_max_concurrent_downloads(0);
    assert!(matches!(prefs.validate(), Err(Error::Config(_))));
}
