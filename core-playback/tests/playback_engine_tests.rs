mod common;

use bridge_traits::{ErrorKind, NetworkInfo, NetworkType};
use common::{Harness, OutputCall, StubHttpClient};
use core_library::TrackId;
use core_playback::{
    DownloadConfig, EngineConfig, EngineSnapshot, NetworkPolicy, PlaybackEngine, PlaybackError,
    PlaybackPhase, RepeatMode,
};
use core_runtime::events::{CoreEvent, PlaybackEvent, Receiver};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn engine_for(harness: &Harness) -> PlaybackEngine {
    engine_with(harness, EngineConfig::default())
}

fn engine_with(harness: &Harness, config: EngineConfig) -> PlaybackEngine {
    let scheduler = harness.scheduler(
        DownloadConfig::new().with_retry_base_delay(Duration::from_millis(10)),
    );
    harness.engine(scheduler, config)
}

async fn wait_until(
    engine: &PlaybackEngine,
    predicate: impl FnMut(&EngineSnapshot) -> bool,
) -> EngineSnapshot {
    let mut rx = engine.subscribe();
    let snapshot = timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("engine did not reach the expected state")
        .expect("engine dropped")
        .clone();
    snapshot
}

async fn wait_for_call(harness: &Harness, predicate: impl Fn(&OutputCall) -> bool) {
    for _ in 0..500 {
        if harness.output.calls().iter().any(&predicate) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("output call never happened: {:?}", harness.output.calls());
}

fn drain(rx: &mut Receiver<CoreEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Playback(event) = event {
            events.push(event);
        }
    }
    events
}

// ============================================================================
// Source selection
// ============================================================================

#[tokio::test]
async fn test_downloaded_track_plays_from_storage() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let id = harness.downloaded_track("local", 180.0).await;

    engine.play(id).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, PlaybackPhase::Playing);
    assert_eq!(snapshot.current_track_id, Some(id));
    assert!(!snapshot.is_streaming_source);
    assert_eq!(snapshot.duration, Some(Duration::from_secs(180)));
    assert_eq!(
        harness.output.calls(),
        vec![
            OutputCall::Load {
                remote: false,
                start_at: Duration::ZERO
            },
            OutputCall::Play
        ]
    );
    assert!(harness.http.requested().is_empty());
    assert_eq!(engine.active_timer_count().await, 2);
}

#[tokio::test]
async fn test_stream_swaps_to_local_payload_at_current_position() {
    let harness = Harness::new(StubHttpClient::gated());
    harness.output.set_reported_duration(Some(Duration::from_secs(200)));
    let engine = engine_for(&harness);
    let mut events = harness.event_bus.subscribe();
    let id = harness.remote_track("streamed").await;

    engine.play(id).await.unwrap();
    let snapshot = engine.snapshot();
    assert!(snapshot.is_streaming_source);
    assert_eq!(snapshot.phase, PlaybackPhase::Playing);
    assert!(engine.scheduler().is_scheduled(&id));

    harness.output.set_position(Duration::from_secs(42));
    harness.http.release(1);

    let swapped = wait_until(&engine, |s| !s.is_streaming_source).await;
    assert_eq!(swapped.phase, PlaybackPhase::Playing);
    assert_eq!(swapped.current_track_id, Some(id));
    assert_eq!(swapped.current_time, Duration::from_secs(42));

    let calls = harness.output.calls();
    assert!(calls.contains(&OutputCall::Swap {
        remote: false,
        position: Duration::from_secs(42)
    }));
    // Audible output never stopped
    assert!(!calls.contains(&OutputCall::Stop));
    assert!(harness.track(&id).await.is_downloaded());

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackEvent::SourceSwapped { position_ms: 42_000, .. }
    )));
}

#[tokio::test]
async fn test_failed_swap_keeps_streaming() {
    let harness = Harness::new(StubHttpClient::open());
    harness.output.fail_swaps();
    let engine = engine_for(&harness);
    let id = harness.remote_track("sticky").await;

    engine.play(id).await.unwrap();
    wait_for_call(&harness, |c| matches!(c, OutputCall::Swap { .. })).await;

    let snapshot = engine.snapshot();
    assert!(snapshot.is_streaming_source);
    assert_eq!(snapshot.phase, PlaybackPhase::Playing);
    assert!(harness.sink.reports().is_empty());
}

#[tokio::test]
async fn test_offline_undownloaded_track_is_rejected() {
    let harness = Harness::new(StubHttpClient::open());
    harness.policy.update(NetworkInfo::offline());
    let engine = engine_for(&harness);
    let id = harness.remote_track("offline").await;

    let err = engine.play(id).await.unwrap_err();
    assert!(matches!(err, PlaybackError::TrackNotDownloaded(_)));
    assert_eq!(engine.snapshot().phase, PlaybackPhase::Stopped);
    assert_eq!(harness.sink.kinds(), vec![ErrorKind::TrackNotDownloaded]);
    assert_eq!(harness.resolver.calls(), 0);
    assert_eq!(engine.active_timer_count().await, 0);
}

#[tokio::test]
async fn test_cellular_streams_without_background_download() {
    let mut harness = Harness::new(StubHttpClient::open());
    harness.policy = NetworkPolicy::new(true, false);
    harness.policy.update(NetworkInfo::connected(NetworkType::Cellular));
    let engine = engine_for(&harness);
    let id = harness.remote_track("metered").await;

    engine.play(id).await.unwrap();
    assert!(engine.snapshot().is_streaming_source);
    assert!(!engine.scheduler().is_scheduled(&id));
    assert!(harness.http.requested().is_empty());
}

#[tokio::test]
async fn test_missing_payload_reports_file_not_found() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let id = harness.downloaded_track("vanished", 60.0).await;
    bridge_traits::StorageGateway::delete(harness.storage.as_ref(), &id.storage_key())
        .await
        .unwrap();

    let err = engine.play(id).await.unwrap_err();
    assert!(matches!(err, PlaybackError::FileNotFound(_)));
    assert_eq!(engine.snapshot().phase, PlaybackPhase::Stopped);
    assert_eq!(harness.sink.kinds(), vec![ErrorKind::FileNotFound]);
}

#[tokio::test]
async fn test_unknown_track_is_rejected() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);

    let err = engine.play(TrackId::new()).await.unwrap_err();
    assert!(matches!(err, PlaybackError::UnknownTrack(_)));
    assert_eq!(engine.snapshot().phase, PlaybackPhase::Stopped);
}

#[tokio::test]
async fn test_fallback_downloads_when_streaming_fails() {
    let harness = Harness::new(StubHttpClient::open());
    harness.resolver.fail_next(1);
    let engine = engine_for(&harness);
    let id = harness.remote_track("fallback").await;

    engine.play_with_fallback(id).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, PlaybackPhase::Playing);
    assert!(!snapshot.is_streaming_source);
    assert!(harness.track(&id).await.is_downloaded());
    assert_eq!(harness.sink.kinds(), vec![ErrorKind::StreamingFailed]);
}

// ============================================================================
// Transport
// ============================================================================

#[tokio::test]
async fn test_pause_resume_and_stop() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let id = harness.downloaded_track("transport", 180.0).await;

    engine.play(id).await.unwrap();
    harness.output.set_position(Duration::from_secs(30));

    engine.pause().await.unwrap();
    let paused = engine.snapshot();
    assert_eq!(paused.phase, PlaybackPhase::Paused);
    assert_eq!(paused.current_time, Duration::from_secs(30));
    assert_eq!(engine.active_timer_count().await, 0);

    engine.toggle_play_pause().await.unwrap();
    assert_eq!(engine.snapshot().phase, PlaybackPhase::Playing);
    assert_eq!(engine.active_timer_count().await, 2);

    engine.stop().await.unwrap();
    assert_eq!(engine.snapshot().phase, PlaybackPhase::Stopped);
    assert_eq!(engine.active_timer_count().await, 0);
    assert_eq!(harness.output.calls().last(), Some(&OutputCall::Stop));
}

#[tokio::test]
async fn test_seek_clamps_to_duration() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let id = harness.downloaded_track("seekable", 180.0).await;

    engine.play(id).await.unwrap();
    engine.seek(Duration::from_secs(500)).await.unwrap();

    assert_eq!(engine.snapshot().current_time, Duration::from_secs(180));
    assert!(harness
        .output
        .calls()
        .contains(&OutputCall::Seek(Duration::from_secs(180))));
}

#[tokio::test]
async fn test_seek_without_duration_keeps_playing() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_with(
        &harness,
        EngineConfig::new().with_download_while_streaming(false),
    );
    let id = harness.remote_track("live").await;

    engine.play(id).await.unwrap();
    assert_eq!(engine.snapshot().duration, None);

    let err = engine.seek(Duration::from_secs(10)).await.unwrap_err();
    assert!(matches!(err, PlaybackError::SeekFailed(_)));
    assert_eq!(engine.snapshot().phase, PlaybackPhase::Playing);
    assert_eq!(harness.sink.kinds(), vec![ErrorKind::SeekFailed]);
    assert!(!harness
        .output
        .calls()
        .iter()
        .any(|c| matches!(c, OutputCall::Seek(_))));
}

// ============================================================================
// Queue integration
// ============================================================================

#[tokio::test]
async fn test_auto_advance_then_stop_at_end_of_queue() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let mut events = harness.event_bus.subscribe();
    let a = harness.downloaded_track("a", 180.0).await;
    let b = harness.downloaded_track("b", 180.0).await;

    engine.set_queue(vec![a, b], 0).await.unwrap();
    engine.play_queue(0).await.unwrap();

    harness.output.finish_source();
    wait_until(&engine, |s| {
        s.current_track_id == Some(b) && s.phase == PlaybackPhase::Playing
    })
    .await;

    harness.output.finish_source();
    let stopped = wait_until(&engine, |s| s.phase == PlaybackPhase::Stopped).await;
    assert_eq!(stopped.current_track_id, Some(b));
    assert_eq!(engine.active_timer_count().await, 0);

    let completed: Vec<String> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            PlaybackEvent::Completed { track_id } => Some(track_id),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![a.to_string(), b.to_string()]);
}

#[tokio::test]
async fn test_end_of_track_poll_finishes_track() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_with(
        &harness,
        EngineConfig::new().with_end_of_track_poll_interval(Duration::from_millis(50)),
    );
    let id = harness.downloaded_track("short", 10.0).await;

    engine.play(id).await.unwrap();
    harness.output.set_position(Duration::from_millis(9_900));

    wait_until(&engine, |s| s.phase == PlaybackPhase::Stopped).await;
}

#[tokio::test]
async fn test_repeat_one_replays_current_track() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let a = harness.downloaded_track("a", 180.0).await;
    let b = harness.downloaded_track("b", 180.0).await;

    engine.set_queue(vec![a, b], 0).await.unwrap();
    engine.set_repeat_mode(RepeatMode::One).await;
    engine.play_queue(0).await.unwrap();

    harness.output.finish_source();
    for _ in 0..500 {
        let loads = harness
            .output
            .calls()
            .iter()
            .filter(|c| matches!(c, OutputCall::Load { .. }))
            .count();
        if loads == 2 && engine.snapshot().is_playing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.snapshot().current_track_id, Some(a));
    assert!(engine.snapshot().is_playing());
}

#[tokio::test]
async fn test_skip_next_and_previous() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let a = harness.downloaded_track("a", 180.0).await;
    let b = harness.downloaded_track("b", 180.0).await;
    let c = harness.downloaded_track("c", 180.0).await;

    engine.set_queue(vec![a, b, c], 0).await.unwrap();
    engine.play_queue(0).await.unwrap();

    engine.skip_to_next().await.unwrap();
    assert_eq!(engine.snapshot().current_track_id, Some(b));

    engine.skip_to_previous().await.unwrap();
    assert_eq!(engine.snapshot().current_track_id, Some(a));

    // Clamped at the start
    engine.skip_to_previous().await.unwrap();
    assert_eq!(engine.snapshot().current_track_id, Some(a));
    assert_eq!(engine.queue_state().await.current_index(), Some(0));
}

#[tokio::test]
async fn test_play_selects_queued_track() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let a = harness.downloaded_track("a", 180.0).await;
    let b = harness.downloaded_track("b", 180.0).await;

    engine.set_queue(vec![a, b], 0).await.unwrap();
    engine.play(b).await.unwrap();

    assert_eq!(engine.queue_state().await.current(), Some(b));
}

#[tokio::test]
async fn test_removing_playing_track_moves_on() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let a = harness.downloaded_track("a", 180.0).await;
    let b = harness.downloaded_track("b", 180.0).await;

    engine.set_queue(vec![a, b], 0).await.unwrap();
    engine.play_queue(0).await.unwrap();
    engine.remove_from_queue(&a).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.current_track_id, Some(b));
    assert_eq!(snapshot.phase, PlaybackPhase::Playing);
    assert_eq!(engine.queue_state().await.order(), &[b]);
}

#[tokio::test]
async fn test_toggle_from_stopped_starts_queue() {
    let harness = Harness::new(StubHttpClient::open());
    let engine = engine_for(&harness);
    let a = harness.downloaded_track("a", 180.0).await;

    // Nothing queued: no-op
    engine.toggle_play_pause().await.unwrap();
    assert_eq!(engine.snapshot().phase, PlaybackPhase::Idle);

    engine.set_queue(vec![a], 0).await.unwrap();
    engine.toggle_play_pause().await.unwrap();
    assert_eq!(engine.snapshot().current_track_id, Some(a));
    assert!(engine.snapshot().is_playing());
}

#[tokio::test]
async fn test_download_for_previous_track_does_not_swap() {
    let harness = Harness::new(StubHttpClient::gated());
    let engine = engine_for(&harness);
    let streamed = harness.remote_track("streamed").await;
    let local = harness.downloaded_track("local", 180.0).await;

    engine.play(streamed).await.unwrap();
    engine.play(local).await.unwrap();
    harness.http.release(1);

    for _ in 0..500 {
        if harness.track(&streamed).await.is_downloaded() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(harness.track(&streamed).await.is_downloaded());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!harness
        .output
        .calls()
        .iter()
        .any(|c| matches!(c, OutputCall::Swap { .. })));
    assert_eq!(engine.snapshot().current_track_id, Some(local));
}
