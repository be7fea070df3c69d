//! Typed publish/subscribe between the sync components.
//!
//! Dispatch is synchronous and ordered by subscription. A subscriber that
//! returns an error or panics is logged and skipped; the remaining
//! subscribers still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{LocationRecord, NextPrayer, ScheduleOrigin};

/// Event published by the sync core.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The active location was replaced.
    LocationChanged(LocationRecord),
    /// A schedule was produced for `date`.
    ScheduleUpdated {
        /// Gregorian date of the schedule.
        date: NaiveDate,
        /// Where the schedule came from.
        origin: ScheduleOrigin,
    },
    /// A background refresh failed and was swallowed.
    RefreshFailed {
        /// Failure description.
        message: String,
    },
    /// The platform connectivity flag changed.
    ConnectivityChanged {
        /// New connectivity state.
        online: bool,
    },
    /// The local calendar date advanced.
    DayRolledOver {
        /// The new local date.
        date: NaiveDate,
    },
    /// Periodic countdown evaluation.
    CountdownTick(NextPrayer),
    /// The offline proxy discarded caches from an older version.
    CachesInvalidated {
        /// Version marker now active.
        version: String,
    },
    /// Clients should reload after cache invalidation.
    ReloadRequired,
}

/// Discriminant used to route events to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEventKind {
    LocationChanged,
    ScheduleUpdated,
    RefreshFailed,
    ConnectivityChanged,
    DayRolledOver,
    CountdownTick,
    CachesInvalidated,
    ReloadRequired,
}

impl SyncEvent {
    /// Routing key for this event.
    pub fn kind(&self) -> SyncEventKind {
        match self {
            Self::LocationChanged(_) => SyncEventKind::LocationChanged,
            Self::ScheduleUpdated { .. } => SyncEventKind::ScheduleUpdated,
            Self::RefreshFailed { .. } => SyncEventKind::RefreshFailed,
            Self::ConnectivityChanged { .. } => SyncEventKind::ConnectivityChanged,
            Self::DayRolledOver { .. } => SyncEventKind::DayRolledOver,
            Self::CountdownTick(_) => SyncEventKind::CountdownTick,
            Self::CachesInvalidated { .. } => SyncEventKind::CachesInvalidated,
            Self::ReloadRequired => SyncEventKind::ReloadRequired,
        }
    }
}

/// Failure reported by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("subscriber failed: {message}")]
pub struct SubscriberError {
    message: String,
}

impl SubscriberError {
    /// Build an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&SyncEvent) -> Result<(), SubscriberError> + Send + Sync>;

/// Ordered, exception-isolated event dispatcher.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SyncEventKind, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// use prayer_sync::domain::{EventBus, SyncEvent, SyncEventKind};
    ///
    /// let bus = EventBus::new();
    /// let seen = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&seen);
    /// bus.subscribe(SyncEventKind::ReloadRequired, move |_| {
    ///     counter.fetch_add(1, Ordering::SeqCst);
    ///     Ok(())
    /// });
    /// bus.publish(&SyncEvent::ReloadRequired);
    /// assert_eq!(seen.load(Ordering::SeqCst), 1);
    /// ```
    pub fn subscribe<F>(&self, kind: SyncEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns `false` when `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for handlers in subscribers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    /// Deliver `event` to its subscribers in registration order.
    ///
    /// Returns how many subscribers completed without error.
    pub fn publish(&self, event: &SyncEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<(SubscriptionId, Handler)> = {
            let subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.get(&kind).cloned().unwrap_or_default()
        };

        debug!(?kind, subscribers = handlers.len(), "publishing sync event");
        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(error)) => {
                    warn!(?kind, subscription = id.0, error = %error, "event subscriber failed");
                }
                Err(_) => {
                    warn!(?kind, subscription = id.0, "event subscriber panicked");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn bus() -> EventBus {
        EventBus::new()
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl Fn(&SyncEvent) -> Result<(), SubscriberError> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_| {
            log.lock().expect("log mutex").push(label);
            Ok(())
        }
    }

    #[rstest]
    fn dispatches_in_subscription_order(bus: EventBus) {
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(SyncEventKind::ReloadRequired, recorder(&log, "first"));
        bus.subscribe(SyncEventKind::ReloadRequired, recorder(&log, "second"));

        assert_eq!(bus.publish(&SyncEvent::ReloadRequired), 2);
        assert_eq!(*log.lock().expect("log mutex"), vec!["first", "second"]);
    }

    #[rstest]
    fn failing_and_panicking_subscribers_do_not_stop_dispatch(bus: EventBus) {
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(SyncEventKind::ReloadRequired, |_| {
            Err(SubscriberError::new("render failed"))
        });
        bus.subscribe(SyncEventKind::ReloadRequired, |_| panic!("subscriber bug"));
        bus.subscribe(SyncEventKind::ReloadRequired, recorder(&log, "survivor"));

        assert_eq!(bus.publish(&SyncEvent::ReloadRequired), 1);
        assert_eq!(*log.lock().expect("log mutex"), vec!["survivor"]);
    }

    #[rstest]
    fn only_matching_kind_is_notified(bus: EventBus) {
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(SyncEventKind::ConnectivityChanged, recorder(&log, "online"));

        assert_eq!(bus.publish(&SyncEvent::ReloadRequired), 0);
        assert!(log.lock().expect("log mutex").is_empty());
    }

    #[rstest]
    fn unsubscribe_removes_handler(bus: EventBus) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe(SyncEventKind::ReloadRequired, recorder(&log, "gone"));

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&SyncEvent::ReloadRequired);
        assert!(log.lock().expect("log mutex").is_empty());
    }

    #[rstest]
    fn subscribers_may_publish_reentrantly(bus: EventBus) {
        let bus = Arc::new(bus);
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(SyncEventKind::ReloadRequired, recorder(&log, "reload"));
        let inner = Arc::clone(&bus);
        bus.subscribe(SyncEventKind::CachesInvalidated, move |_| {
            inner.publish(&SyncEvent::ReloadRequired);
            Ok(())
        });

        bus.publish(&SyncEvent::CachesInvalidated {
            version: "v2".to_owned(),
        });
        assert_eq!(*log.lock().expect("log mutex"), vec!["reload"]);
    }
}
