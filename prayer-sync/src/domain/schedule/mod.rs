//! Schedule cache and fetch orchestration.
//!
//! Reads follow memory → cache → network, never the reverse. The cache
//! honours TTLs while online; offline, any stored schedule for the date is
//! preferred over an error. Concurrent refreshes of the same date are not
//! serialised: the write that completes last wins in both memory and cache.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::countdown::CountdownSource;
use crate::domain::ports::{ConnectivityProbe, FetchError, ScheduleQuery, ScheduleSource};
use crate::domain::{
    EventBus, ExpiringStore, LocationError, LocationRecord, LocationResolver, SyncEvent,
};

mod model;
mod next_prayer;
mod normalize;

pub use model::{
    HijriDate, LocationSnapshot, PrayerKey, PrayerSchedule, PrayerTime, PrayerTiming,
    ScheduleDate, TimingSource, derive_imsak,
};
pub use next_prayer::{CurrentPrayer, NextPrayer, Remaining, current_prayer, next_prayer};
use normalize::ParsedDay;

const LEDGER_SUBSYSTEM: &str = "prayer";

/// Failures surfaced by foreground schedule reads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The API answered with a failure envelope.
    #[error("prayer API reported failure: {message}")]
    ApiLogical { message: String },
    /// The payload did not have the expected shape.
    #[error("prayer API payload invalid: {message}")]
    Decode { message: String },
    #[error(transparent)]
    Location(#[from] LocationError),
    /// Caller supplied an impossible date.
    #[error("invalid schedule request: {message}")]
    InvalidRequest { message: String },
}

/// Where a returned schedule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOrigin {
    Memory,
    Cache,
    /// Served past its TTL because the device is offline.
    StaleCache,
    Network,
}

/// Orchestrator tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Calculation method id passed to the API.
    pub calculation_method: u32,
    /// Minutes before Fajr used when the API omits Imsak.
    pub imsak_offset_minutes: u32,
    /// Lifetime of cached schedules.
    pub schedule_ttl: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            calculation_method: 20,
            imsak_offset_minutes: 10,
            schedule_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Single source of truth for prayer schedules.
pub struct ScheduleOrchestrator {
    source: Arc<dyn ScheduleSource>,
    store: Arc<ExpiringStore>,
    locations: Arc<LocationResolver>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    config: ScheduleConfig,
    today: RwLock<Option<PrayerSchedule>>,
}

impl ScheduleOrchestrator {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        store: Arc<ExpiringStore>,
        locations: Arc<LocationResolver>,
        connectivity: Arc<dyn ConnectivityProbe>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            source,
            store,
            locations,
            connectivity,
            clock,
            events,
            config,
            today: RwLock::new(None),
        }
    }

    /// Today's schedule for the active location.
    ///
    /// `force_refresh` skips both memory and cache and goes to the network.
    pub async fn fetch_today_schedule(
        &self,
        force_refresh: bool,
    ) -> Result<PrayerSchedule, ScheduleError> {
        let today = self.local_now().date();
        let location = self.locations.get_location_fast();

        if !force_refresh {
            if let Some(schedule) = self.memory_for(today, &location) {
                debug!(%today, "schedule served from memory");
                return Ok(schedule);
            }
            if let Some((schedule, origin)) = self.read_cached(today, &location) {
                self.remember(&schedule);
                self.announce(today, origin);
                return Ok(schedule);
            }
        }

        let schedule = self.fetch_day(today, &location).await?;
        self.remember(&schedule);
        self.announce(today, ScheduleOrigin::Network);
        Ok(schedule)
    }

    /// Schedule for an arbitrary date. Only today's schedule is kept in memory.
    pub async fn fetch_schedule_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<PrayerSchedule, ScheduleError> {
        if date == self.local_now().date() {
            return self.fetch_today_schedule(false).await;
        }
        let location = self.locations.get_location_fast();
        if let Some((schedule, origin)) = self.read_cached(date, &location) {
            self.announce(date, origin);
            return Ok(schedule);
        }
        let schedule = self.fetch_day(date, &location).await?;
        self.announce(date, ScheduleOrigin::Network);
        Ok(schedule)
    }

    /// Every day of `month`/`year`, cached as a whole and per day.
    pub async fn fetch_monthly_schedule(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Vec<PrayerSchedule>, ScheduleError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(ScheduleError::InvalidRequest {
                message: format!("month {month} of {year} does not exist"),
            });
        }
        let key = monthly_key(year, month);
        let location = self.locations.get_location_fast();
        let cached: Option<Vec<PrayerSchedule>> = if self.connectivity.is_online() {
            self.store.get::<Vec<PrayerSchedule>>(&key).filter(|days| {
                days.first()
                    .is_some_and(|day| day.is_for_location(&location.coordinates()))
            })
        } else {
            self.store.get_ignoring_ttl(&key)
        };
        if let Some(days) = cached {
            debug!(key = %key, days = days.len(), "monthly schedule served from cache");
            return Ok(days);
        }

        let query = self.located_query(format!("calendar/{year}/{month}"), &location);
        let payload = self.source.fetch_json(&query).await?;
        let days = normalize::parse_calendar(&payload)?
            .into_iter()
            .map(|day| self.build_schedule(day, &location))
            .collect::<Result<Vec<_>, _>>()?;

        let ttl = Some(self.config.schedule_ttl);
        for day in &days {
            self.store.set(&schedule_key(day.gregorian()), day, ttl);
        }
        self.store.set(&key, &days, ttl);
        self.finish_write();
        info!(key = %key, days = days.len(), "monthly schedule fetched");
        Ok(days)
    }

    /// Hijri date for `date`; conversions are cached permanently.
    pub async fn fetch_hijri_date(&self, date: NaiveDate) -> Result<HijriDate, ScheduleError> {
        let key = format!("hijri:{date}");
        if let Some(hijri) = self.store.get::<HijriDate>(&key) {
            return Ok(hijri);
        }
        if let Some(hijri) = self
            .memory_schedule()
            .filter(|schedule| schedule.gregorian() == date)
            .and_then(|schedule| schedule.date().hijri.clone())
        {
            return Ok(hijri);
        }
        let query = ScheduleQuery::new(format!("gToH/{}", api_date(date)));
        let payload = self.source.fetch_json(&query).await?;
        let hijri = normalize::parse_conversion(&payload)?;
        self.store.set(&key, &hijri, None);
        Ok(hijri)
    }

    /// Next prayer from the in-memory schedule; no I/O.
    pub fn get_next_prayer(&self) -> Option<NextPrayer> {
        self.next_prayer_at(self.local_now())
    }

    /// Current prayer from the in-memory schedule; no I/O.
    pub fn get_current_prayer(&self) -> Option<CurrentPrayer> {
        let schedule = self.memory_schedule()?;
        current_prayer(&schedule, self.local_now())
    }

    /// Passive refresh. Failures are logged, announced, and swallowed so a
    /// working cached state never regresses to an error.
    pub async fn background_refresh(&self) -> Option<PrayerSchedule> {
        match self.fetch_today_schedule(true).await {
            Ok(schedule) => Some(schedule),
            Err(error) => {
                warn!(error = %error, "background schedule refresh failed");
                self.events.publish(&SyncEvent::RefreshFailed {
                    message: error.to_string(),
                });
                None
            }
        }
    }

    /// Today's in-memory schedule.
    pub fn current_schedule(&self) -> Option<PrayerSchedule> {
        self.memory_schedule()
    }

    /// Forget the in-memory schedule after the location changed.
    ///
    /// Cached entries stay: they are validated against the location on read.
    pub fn invalidate_for_location_change(&self) -> bool {
        let dropped = self
            .today
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if dropped {
            debug!("in-memory schedule dropped after location change");
        }
        dropped
    }

    fn memory_for(&self, date: NaiveDate, location: &LocationRecord) -> Option<PrayerSchedule> {
        self.memory_schedule().filter(|schedule| {
            schedule.gregorian() == date && schedule.is_for_location(&location.coordinates())
        })
    }

    fn read_cached(
        &self,
        date: NaiveDate,
        location: &LocationRecord,
    ) -> Option<(PrayerSchedule, ScheduleOrigin)> {
        let key = schedule_key(date);
        if !self.connectivity.is_online() {
            let schedule = self.store.get_ignoring_ttl::<PrayerSchedule>(&key)?;
            info!(key = %key, "offline; serving stored schedule regardless of age");
            return Some((schedule, ScheduleOrigin::StaleCache));
        }
        let schedule = self.store.get::<PrayerSchedule>(&key)?;
        if schedule.is_for_location(&location.coordinates()) {
            debug!(key = %key, "schedule served from cache");
            Some((schedule, ScheduleOrigin::Cache))
        } else {
            debug!(key = %key, "cached schedule belongs to another location");
            None
        }
    }

    async fn fetch_day(
        &self,
        date: NaiveDate,
        location: &LocationRecord,
    ) -> Result<PrayerSchedule, ScheduleError> {
        let query = self.located_query(format!("timings/{}", api_date(date)), location);
        let payload = self.source.fetch_json(&query).await?;
        let day = normalize::parse_day(&payload)?;
        if day.gregorian != date {
            warn!(requested = %date, received = %day.gregorian, "API returned a different date");
        }
        let schedule = self.build_schedule(
            ParsedDay {
                gregorian: date,
                ..day
            },
            location,
        )?;
        self.store.set(
            &schedule_key(date),
            &schedule,
            Some(self.config.schedule_ttl),
        );
        self.finish_write();
        info!(%date, location = %schedule.location().name, "schedule fetched");
        Ok(schedule)
    }

    fn build_schedule(
        &self,
        day: ParsedDay,
        location: &LocationRecord,
    ) -> Result<PrayerSchedule, ScheduleError> {
        PrayerSchedule::new(
            ScheduleDate {
                gregorian: day.gregorian,
                hijri: day.hijri,
            },
            location.into(),
            &day.timings,
            self.config.imsak_offset_minutes,
            self.clock.utc().timestamp_millis(),
        )
    }

    /// Full-precision coordinates; rounding happens only in cache keys.
    fn located_query(&self, path: String, location: &LocationRecord) -> ScheduleQuery {
        let coordinates = location.coordinates();
        ScheduleQuery::new(path)
            .param("latitude", coordinates.latitude())
            .param("longitude", coordinates.longitude())
            .param("method", self.config.calculation_method)
    }

    fn finish_write(&self) {
        self.store.touch_last_update(LEDGER_SUBSYSTEM);
        self.store.clean_expired();
    }

    fn remember(&self, schedule: &PrayerSchedule) {
        *self.today.write().unwrap_or_else(PoisonError::into_inner) = Some(schedule.clone());
    }

    fn announce(&self, date: NaiveDate, origin: ScheduleOrigin) {
        self.events
            .publish(&SyncEvent::ScheduleUpdated { date, origin });
    }

    fn memory_schedule(&self) -> Option<PrayerSchedule> {
        self.today
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn local_now(&self) -> NaiveDateTime {
        self.clock.local().naive_local()
    }
}

impl CountdownSource for ScheduleOrchestrator {
    fn next_prayer_at(&self, now: NaiveDateTime) -> Option<NextPrayer> {
        let schedule = self.memory_schedule()?;
        next_prayer(&schedule, now)
    }
}

/// Cache key of the daily schedule for `date`.
pub fn schedule_key(date: NaiveDate) -> String {
    format!("schedule:{date}")
}

fn monthly_key(year: i32, month: u32) -> String {
    format!("monthly:{year}-{month:02}")
}

/// `DD-MM-YYYY` as used in API paths.
pub fn api_date(date: NaiveDate) -> String {
    format!("{:02}-{:02}-{}", date.day(), date.month(), date.year())
}
