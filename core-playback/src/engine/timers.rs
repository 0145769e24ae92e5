//! Cancellable playback timers
//!
//! At most one position-update timer and one end-of-track poll exist at a
//! time. Starting replaces both; pausing or stopping cancels both. Ticks are
//! delivered as [`EngineSignal`]s tagged with the session generation, so a
//! tick that races a track change is recognised as stale and dropped.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::EngineSignal;

#[derive(Debug, Default)]
pub(crate) struct PlaybackTimers {
    time_update: Option<JoinHandle<()>>,
    end_poll: Option<JoinHandle<()>>,
}

impl PlaybackTimers {
    /// Replace both timers with fresh ones for `generation`.
    pub(crate) fn start(
        &mut self,
        generation: u64,
        time_update_interval: Duration,
        end_poll_interval: Duration,
        signals: &UnboundedSender<EngineSignal>,
    ) {
        self.cancel_all();
        self.time_update = Some(spawn_ticker(time_update_interval, signals.clone(), move || {
            EngineSignal::TimeTick { generation }
        }));
        self.end_poll = Some(spawn_ticker(end_poll_interval, signals.clone(), move || {
            EngineSignal::EndOfTrackPoll { generation }
        }));
    }

    pub(crate) fn cancel_all(&mut self) {
        for handle in [self.time_update.take(), self.end_poll.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    /// Number of live timers, `0..=2`.
    pub(crate) fn active(&self) -> usize {
        [&self.time_update, &self.end_poll]
            .into_iter()
            .filter(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
            .count()
    }
}

impl Drop for PlaybackTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn spawn_ticker<F>(period: Duration, signals: UnboundedSender<EngineSignal>, make: F) -> JoinHandle<()>
where
    F: Fn() -> EngineSignal + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if signals.send(make()).is_err() {
                break;
            }
        }
    })
}
