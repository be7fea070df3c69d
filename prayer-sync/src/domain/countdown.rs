//! Fixed-interval countdown re-evaluation.
//!
//! Each tick reads the next prayer from in-memory state only and publishes
//! it; ticks never trigger I/O and are no-ops while no schedule is loaded.
//! A change of local date between ticks publishes
//! [`SyncEvent::DayRolledOver`] so the session can refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use mockable::Clock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::domain::{EventBus, NextPrayer, SyncEvent};

/// In-memory view of the next prayer at a given local time.
pub trait CountdownSource: Send + Sync {
    /// Evaluate against `now` without performing I/O.
    fn next_prayer_at(&self, now: NaiveDateTime) -> Option<NextPrayer>;
}

/// Spawns the periodic countdown task.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountdownTicker;

impl CountdownTicker {
    /// Start ticking every `period`; the first tick fires immediately.
    pub fn spawn(
        source: Arc<dyn CountdownSource>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> CountdownHandle {
        let period = period.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_date: Option<NaiveDate> = None;
            loop {
                interval.tick().await;
                let now = clock.local().naive_local();
                let date = now.date();
                if last_date.is_some_and(|previous| previous != date) {
                    debug!(%date, "local date rolled over");
                    events.publish(&SyncEvent::DayRolledOver { date });
                }
                last_date = Some(date);
                if let Some(next) = source.next_prayer_at(now) {
                    events.publish(&SyncEvent::CountdownTick(next));
                }
            }
        });
        CountdownHandle { task }
    }
}

/// Running countdown. Stopped explicitly or when dropped.
#[derive(Debug)]
pub struct CountdownHandle {
    task: JoinHandle<()>,
}

impl CountdownHandle {
    /// Stop ticking.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use rstest::rstest;
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{PrayerKey, PrayerTime, Remaining, SyncEventKind};
    use crate::test_support::{MutableClock, date, local_datetime};

    #[derive(Default)]
    struct StubSource {
        calls: AtomicUsize,
        answer: Mutex<Option<NextPrayer>>,
    }

    impl StubSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CountdownSource for StubSource {
        fn next_prayer_at(&self, _now: NaiveDateTime) -> Option<NextPrayer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.lock().expect("answer mutex").clone()
        }
    }

    fn asr() -> NextPrayer {
        NextPrayer {
            key: PrayerKey::Asr,
            name: "Ashar".to_owned(),
            time: PrayerTime::from_hm(15, 20).expect("valid time"),
            remaining: Remaining {
                hours: 2,
                minutes: 20,
                seconds: 0,
            },
            is_today: true,
        }
    }

    fn forward(events: &EventBus, kind: SyncEventKind) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        events.subscribe(kind, move |event| {
            drop(tx.send(event.clone()));
            Ok(())
        });
        rx
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn ticks_are_silent_without_a_schedule() {
        let source = Arc::new(StubSource::default());
        let events = Arc::new(EventBus::new());
        let mut ticks = forward(&events, SyncEventKind::CountdownTick);
        let clock = Arc::new(MutableClock::at_local(local_datetime(date(2026, 3, 1), 13, 0)));

        let handle = CountdownTicker::spawn(source.clone(), events, clock, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        handle.stop();

        assert!(source.calls() >= 4, "calls = {}", source.calls());
        assert!(ticks.try_recv().is_err());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn ticks_publish_the_next_prayer() {
        let source = Arc::new(StubSource::default());
        *source.answer.lock().expect("answer mutex") = Some(asr());
        let events = Arc::new(EventBus::new());
        let mut ticks = forward(&events, SyncEventKind::CountdownTick);
        let clock = Arc::new(MutableClock::at_local(local_datetime(date(2026, 3, 1), 13, 0)));

        let _handle = CountdownTicker::spawn(source, events, clock, Duration::from_secs(1));

        let event = ticks.recv().await.expect("tick published");
        assert_eq!(event, SyncEvent::CountdownTick(asr()));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn date_change_between_ticks_publishes_rollover() {
        let source = Arc::new(StubSource::default());
        let events = Arc::new(EventBus::new());
        let mut rollovers = forward(&events, SyncEventKind::DayRolledOver);
        let start = date(2026, 3, 1)
            .and_hms_opt(23, 59, 59)
            .expect("valid time");
        let clock = Arc::new(MutableClock::at_local(start));

        let _handle = CountdownTicker::spawn(
            source.clone(),
            events,
            clock.clone(),
            Duration::from_secs(1),
        );
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }
        clock.advance(Duration::from_secs(2));

        let event = rollovers.recv().await.expect("rollover published");
        assert_eq!(
            event,
            SyncEvent::DayRolledOver {
                date: date(2026, 3, 2)
            }
        );
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn stopped_ticker_no_longer_runs() {
        let source = Arc::new(StubSource::default());
        let clock = Arc::new(MutableClock::at_local(local_datetime(date(2026, 3, 1), 13, 0)));
        let handle = CountdownTicker::spawn(
            source.clone(),
            Arc::new(EventBus::new()),
            clock,
            Duration::from_secs(1),
        );
        while source.calls() == 0 {
            tokio::task::yield_now().await;
        }
        handle.stop();
        let calls = source.calls();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls(), calls);
    }
}
