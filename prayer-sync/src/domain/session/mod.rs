//! Session object wiring every component over one set of ports.
//!
//! The session owns the only long-lived instances: one event bus, one
//! store, one proxy, one fetcher, one resolver, one orchestrator. The
//! fetcher talks to the network through the proxy.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::NaiveDate;
use mockable::Clock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::ports::{
    ConnectivityProbe, GeolocationProvider, HttpTransport, RegionLookup, ResponseCacheStore,
    StorageBackend,
};
use crate::domain::{
    ActivationOutcome, CountdownHandle, CountdownTicker, Error, EventBus, ExpiringStore,
    FetchConfig, LocationRecord, LocationResolver, NextPrayer, OfflineCacheProxy, PrayerSchedule,
    ProxyConfig, ResilientFetcher, ResolverConfig, ScheduleConfig, ScheduleOrchestrator,
    SubscriptionId, SyncEvent, SyncEventKind,
};

/// Adapters a session runs on.
#[derive(Clone)]
pub struct SessionPorts {
    /// Real network; wrapped by the offline proxy.
    pub transport: Arc<dyn HttpTransport>,
    pub storage: Arc<dyn StorageBackend>,
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub regions: Arc<dyn RegionLookup>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub response_cache: Arc<dyn ResponseCacheStore>,
    pub clock: Arc<dyn Clock>,
}

/// Per-component configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub fetch: FetchConfig,
    pub schedule: ScheduleConfig,
    pub resolver: ResolverConfig,
    pub proxy: ProxyConfig,
    /// Countdown re-evaluation period.
    pub countdown_interval: Duration,
    /// Prefix of every key the session writes to storage.
    pub storage_namespace: String,
}

/// What the first paint has to work with.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupReport {
    pub location: LocationRecord,
    pub schedule: Option<PrayerSchedule>,
    pub next_prayer: Option<NextPrayer>,
    /// `None` when the proxy could not be activated.
    pub activation: Option<ActivationOutcome>,
    /// Foreground schedule failure, when there was one.
    pub error: Option<Error>,
}

/// Explicit context replacing process-wide singletons.
pub struct SyncSession {
    events: Arc<EventBus>,
    store: Arc<ExpiringStore>,
    proxy: Arc<OfflineCacheProxy>,
    fetcher: Arc<ResilientFetcher>,
    locations: Arc<LocationResolver>,
    schedule: Arc<ScheduleOrchestrator>,
    clock: Arc<dyn Clock>,
    connectivity: Arc<dyn ConnectivityProbe>,
    countdown_interval: Duration,
}

impl SyncSession {
    /// Build every component over `ports`.
    pub fn assemble(ports: SessionPorts, config: SessionConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let store = Arc::new(ExpiringStore::new(
            ports.storage,
            Arc::clone(&ports.clock),
            config.storage_namespace,
        ));
        let proxy = Arc::new(OfflineCacheProxy::new(
            ports.transport,
            ports.response_cache,
            config.proxy,
        ));
        let fetcher = Arc::new(ResilientFetcher::new(
            proxy.clone(),
            Arc::clone(&ports.clock),
            config.fetch,
        ));
        let locations = Arc::new(LocationResolver::new(
            ports.regions,
            ports.geolocation,
            Arc::clone(&store),
            Arc::clone(&ports.clock),
            Arc::clone(&events),
            config.resolver,
        ));
        let schedule = Arc::new(ScheduleOrchestrator::new(
            fetcher.clone(),
            Arc::clone(&store),
            Arc::clone(&locations),
            Arc::clone(&ports.connectivity),
            Arc::clone(&ports.clock),
            Arc::clone(&events),
            config.schedule,
        ));
        Self {
            events,
            store,
            proxy,
            fetcher,
            locations,
            schedule,
            clock: ports.clock,
            connectivity: ports.connectivity,
            countdown_interval: config.countdown_interval,
        }
    }

    /// Startup sequence: activate the proxy, resolve a location without
    /// waiting for GPS, then load today's schedule.
    ///
    /// Never fails; a schedule failure is reported in
    /// [`StartupReport::error`] next to whatever location was resolved.
    pub async fn start(&self) -> StartupReport {
        self.launch(false).await
    }

    /// [`Self::start`], but today's schedule skips memory and storage and
    /// comes straight from the network.
    pub async fn start_refreshed(&self) -> StartupReport {
        self.launch(true).await
    }

    async fn launch(&self, force_refresh: bool) -> StartupReport {
        let activation = match self.proxy.activate().await {
            Ok(outcome) => {
                if let ActivationOutcome::Invalidated { .. } = &outcome {
                    self.events.publish(&SyncEvent::CachesInvalidated {
                        version: self.proxy.config().version.clone(),
                    });
                    self.events.publish(&SyncEvent::ReloadRequired);
                }
                Some(outcome)
            }
            Err(error) => {
                warn!(error = %error, "offline proxy activation failed");
                None
            }
        };

        let location = self.locations.get_location_fast();
        info!(
            location = %location.display_name(),
            source = ?location.source(),
            force_refresh,
            "session starting"
        );
        let (schedule, error) = match self.schedule.fetch_today_schedule(force_refresh).await {
            Ok(schedule) => (Some(schedule), None),
            Err(error) => {
                warn!(error = %error, "initial schedule unavailable");
                (None, Some(Error::from(error)))
            }
        };
        StartupReport {
            location,
            next_prayer: self.schedule.get_next_prayer(),
            schedule,
            activation,
            error,
        }
    }

    /// Single GPS attempt once the first render settled. When the fix
    /// moves the user somewhere else, the schedule is reloaded for it.
    pub async fn retry_gps_after_render(&self) -> Option<LocationRecord> {
        let previous = self.locations.current();
        let record = self.locations.retry_gps().await?;
        let moved = previous.is_none_or(|previous| !previous.same_place(&record));
        if moved {
            self.reload_for_location().await;
        }
        Some(record)
    }

    /// Manually select a regency and load its schedule.
    ///
    /// # Errors
    ///
    /// Returns a `RegionNotFound` error for unknown ids and the mapped
    /// schedule error when the foreground fetch fails.
    pub async fn select_region(&self, id: &str) -> Result<PrayerSchedule, Error> {
        self.locations.set_by_region_id(id)?;
        self.schedule.invalidate_for_location_change();
        Ok(self.schedule.fetch_today_schedule(false).await?)
    }

    /// Passive refresh; failures are logged and swallowed.
    pub async fn refresh_in_background(&self) -> Option<PrayerSchedule> {
        self.schedule.background_refresh().await
    }

    /// Report a connectivity transition observed by the host.
    ///
    /// The state is written to the shared connectivity port, so reads made
    /// while offline may serve expired schedules. Coming back online
    /// triggers a background refresh.
    pub async fn set_online(&self, online: bool) -> Option<PrayerSchedule> {
        let previous = self.connectivity.set_online(online);
        if previous == online {
            return None;
        }
        info!(online, "connectivity changed");
        self.events
            .publish(&SyncEvent::ConnectivityChanged { online });
        if online {
            self.refresh_in_background().await
        } else {
            None
        }
    }

    /// Load the schedule for the new local date.
    pub async fn handle_day_rollover(&self, date: NaiveDate) -> Option<PrayerSchedule> {
        info!(%date, "day rolled over; loading new schedule");
        self.reload_quietly().await
    }

    /// Start the periodic countdown over the in-memory schedule.
    pub fn start_countdown(&self) -> CountdownHandle {
        CountdownTicker::spawn(
            self.schedule.clone(),
            Arc::clone(&self.events),
            Arc::clone(&self.clock),
            self.countdown_interval,
        )
    }

    /// React to day rollovers and device-follow location changes in the
    /// background until the returned handle is dropped.
    pub fn spawn_reactor(self: &Arc<Self>) -> SessionReactor {
        let (sender, mut receiver) = mpsc::unbounded_channel::<SyncEvent>();
        let subscriptions = [SyncEventKind::DayRolledOver, SyncEventKind::LocationChanged]
            .into_iter()
            .map(|kind| {
                let sender = sender.clone();
                self.events.subscribe(kind, move |event| {
                    // A closed channel only means the reactor already stopped.
                    drop(sender.send(event.clone()));
                    Ok(())
                })
            })
            .collect();

        let session: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                match event {
                    SyncEvent::DayRolledOver { date } => {
                        session.handle_day_rollover(date).await;
                    }
                    SyncEvent::LocationChanged(record) => {
                        debug!(location = %record.display_name(), "reloading schedule for new location");
                        session.reload_for_location().await;
                    }
                    _ => {}
                }
            }
        });

        SessionReactor {
            events: Arc::clone(&self.events),
            subscriptions,
            task,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn store(&self) -> &Arc<ExpiringStore> {
        &self.store
    }

    pub fn proxy(&self) -> &Arc<OfflineCacheProxy> {
        &self.proxy
    }

    pub fn fetcher(&self) -> &Arc<ResilientFetcher> {
        &self.fetcher
    }

    pub fn locations(&self) -> &Arc<LocationResolver> {
        &self.locations
    }

    pub fn schedule(&self) -> &Arc<ScheduleOrchestrator> {
        &self.schedule
    }

    async fn reload_for_location(&self) -> Option<PrayerSchedule> {
        self.schedule.invalidate_for_location_change();
        self.reload_quietly().await
    }

    async fn reload_quietly(&self) -> Option<PrayerSchedule> {
        match self.schedule.fetch_today_schedule(false).await {
            Ok(schedule) => Some(schedule),
            Err(error) => {
                warn!(error = %error, "schedule reload failed");
                self.events.publish(&SyncEvent::RefreshFailed {
                    message: error.to_string(),
                });
                None
            }
        }
    }
}

/// Background reaction loop. Unsubscribes and stops when dropped.
pub struct SessionReactor {
    events: Arc<EventBus>,
    subscriptions: Vec<SubscriptionId>,
    task: JoinHandle<()>,
}

impl SessionReactor {
    /// Stop reacting.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for SessionReactor {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.events.unsubscribe(id);
        }
        self.task.abort();
    }
}
