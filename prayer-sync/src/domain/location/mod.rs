//! Location priority chain: manual override, live GPS, saved record,
//! configured default, and finally a synthetic best-effort record.
//!
//! Geolocation failures never escape the chain; only the explicit
//! `detect_location` and manual setters report errors.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use mockable::Clock;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::ports::{GeoFix, GeolocationError, GeolocationProvider, RegionLookup, WatchId};
use crate::domain::{Coordinate, CoordinateError, EventBus, ExpiringStore, SyncEvent};

mod model;

pub use model::{LocationRecord, LocationSource, Region};
use model::PersistedLocation;

const LOCATION_KEY: &str = "location";
const LEDGER_SUBSYSTEM: &str = "location";

/// Failures reported by the resolver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// The platform has no geolocation.
    #[error("geolocation is unavailable on this platform")]
    GeolocationUnavailable,
    /// Permission was refused or no fix arrived in time.
    #[error("geolocation denied or timed out: {reason}")]
    GeolocationDeniedOrTimedOut {
        /// Provider-reported cause.
        reason: String,
    },
    /// A fix was obtained but no region carries coordinates.
    #[error("no region with coordinates near the device")]
    NoNearbyRegion,
    /// A manual selection referenced an unknown id.
    #[error("region {id} not found")]
    RegionNotFound {
        /// Requested identifier.
        id: String,
    },
    /// Manual coordinates were out of range.
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),
    /// No tier produced a record.
    #[error("no location could be resolved")]
    LocationUnavailable,
}

impl From<GeolocationError> for LocationError {
    fn from(value: GeolocationError) -> Self {
        match value {
            GeolocationError::Unsupported => Self::GeolocationUnavailable,
            other => Self::GeolocationDeniedOrTimedOut {
                reason: other.to_string(),
            },
        }
    }
}

/// Resolution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStatus {
    Unresolved,
    Resolving,
    Resolved,
}

/// Resolver tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Regency (or province) id used when nothing better is known.
    pub default_region_id: String,
    /// Coordinates of the synthetic last-resort record.
    pub default_coordinate: Coordinate,
    /// Deadline for one GPS fix.
    pub gps_timeout: Duration,
}

#[derive(Debug)]
struct ResolverState {
    status: ResolverStatus,
    current: Option<LocationRecord>,
}

/// Produces the best-known [`LocationRecord`].
pub struct LocationResolver {
    regions: Arc<dyn RegionLookup>,
    geolocation: Arc<dyn GeolocationProvider>,
    store: Arc<ExpiringStore>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    config: ResolverConfig,
    state: Mutex<ResolverState>,
}

impl LocationResolver {
    pub fn new(
        regions: Arc<dyn RegionLookup>,
        geolocation: Arc<dyn GeolocationProvider>,
        store: Arc<ExpiringStore>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            regions,
            geolocation,
            store,
            clock,
            events,
            config,
            state: Mutex::new(ResolverState {
                status: ResolverStatus::Unresolved,
                current: None,
            }),
        }
    }

    /// Obtain a GPS fix and reverse-geocode it to the nearest regency.
    ///
    /// Does not change the active record.
    pub async fn detect_location(&self) -> Result<LocationRecord, LocationError> {
        if !self.geolocation.is_supported() {
            return Err(LocationError::GeolocationUnavailable);
        }
        let timeout = self.config.gps_timeout;
        let fix = tokio::time::timeout(timeout, self.geolocation.current_position(timeout))
            .await
            .map_err(|_| LocationError::GeolocationDeniedOrTimedOut {
                reason: format!("no fix within {}ms", timeout.as_millis()),
            })??;
        self.record_for_fix(fix)
    }

    /// Full priority chain: manual, GPS, saved, default, best effort.
    pub async fn get_location(&self) -> LocationRecord {
        if let Some(manual) = self.manual_record() {
            return manual;
        }
        self.set_status(ResolverStatus::Resolving);
        let record = match self.detect_location().await {
            Ok(record) => record,
            Err(error) => {
                info!(error = %error, "GPS tier failed; falling back");
                self.saved_or_default()
            }
        };
        self.adopt(record.clone());
        record
    }

    /// Startup variant that never waits for a GPS prompt.
    pub fn get_location_fast(&self) -> LocationRecord {
        if let Some(current) = self.current() {
            return current;
        }
        let record = self.saved_or_default();
        self.adopt(record.clone());
        record
    }

    /// One GPS attempt after the first render. Failures are swallowed.
    ///
    /// Returns the new record when GPS succeeded; `None` when it failed or a
    /// manual override is active.
    pub async fn retry_gps(&self) -> Option<LocationRecord> {
        if self.manual_record().is_some() {
            debug!("manual location active; skipping GPS retry");
            return None;
        }
        match self.detect_location().await {
            Ok(record) => {
                self.adopt(record.clone());
                Some(record)
            }
            Err(error) => {
                info!(error = %error, "GPS retry failed; keeping current location");
                None
            }
        }
    }

    /// Select a regency by id.
    pub fn set_by_region_id(&self, id: &str) -> Result<LocationRecord, LocationError> {
        let regency = self
            .regions
            .regency(id)
            .ok_or_else(|| LocationError::RegionNotFound { id: id.to_owned() })?;
        let province = self.parent_of(&regency);
        let coordinates = regency.coordinates;
        self.set_manual(Some(regency), province, coordinates)
    }

    /// Select a whole province by id.
    pub fn set_by_province_id(&self, id: &str) -> Result<LocationRecord, LocationError> {
        let province = self
            .regions
            .province(id)
            .ok_or_else(|| LocationError::RegionNotFound { id: id.to_owned() })?;
        let coordinates = province.coordinates;
        self.set_manual(None, Some(province), coordinates)
    }

    /// Select explicit coordinates, labelled with the nearest regency.
    pub fn set_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<LocationRecord, LocationError> {
        let coordinates = Coordinate::new(latitude, longitude)?;
        let regency = self
            .regions
            .nearest_regency(coordinates)
            .ok_or(LocationError::NoNearbyRegion)?;
        let province = self.parent_of(&regency);
        self.set_manual(Some(regency), province, coordinates)
    }

    /// Drop a manual override and re-run the priority chain.
    ///
    /// Publishes `LocationChanged` when the chain lands somewhere other than
    /// the cleared selection.
    pub async fn clear_manual(&self) -> LocationRecord {
        let cleared = self.manual_record();
        if cleared.is_some() {
            self.store.remove(LOCATION_KEY);
            self.lock_state().current = None;
            info!("manual location cleared");
        }
        let record = self.get_location().await;
        if cleared.is_some_and(|cleared| !cleared.same_place(&record)) {
            self.announce_move(&record);
        }
        record
    }

    /// Active record, if resolved.
    pub fn current(&self) -> Option<LocationRecord> {
        self.lock_state().current.clone()
    }

    pub fn status(&self) -> ResolverStatus {
        self.lock_state().status
    }

    /// Follow device movement until the returned handle is released.
    ///
    /// Fixes are ignored while a manual override is active.
    pub fn follow_device(self: &Arc<Self>) -> Result<LocationFollow, LocationError> {
        if !self.geolocation.is_supported() {
            return Err(LocationError::GeolocationUnavailable);
        }
        let (sink, mut fixes) = mpsc::unbounded_channel::<GeoFix>();
        let watch = self.geolocation.watch_position(sink)?;
        let resolver: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(fix) = fixes.recv().await {
                let Some(resolver) = resolver.upgrade() else {
                    break;
                };
                resolver.apply_watch_fix(fix);
            }
        });
        Ok(LocationFollow {
            watch: Some(watch),
            geolocation: Arc::clone(&self.geolocation),
            task,
        })
    }

    fn apply_watch_fix(&self, fix: GeoFix) {
        if self.manual_record().is_some() {
            return;
        }
        match self.record_for_fix(fix) {
            Ok(record) => self.adopt(record),
            Err(error) => debug!(error = %error, "ignoring unusable watch fix"),
        }
    }

    fn record_for_fix(&self, fix: GeoFix) -> Result<LocationRecord, LocationError> {
        let regency = self
            .regions
            .nearest_regency(fix.coordinate)
            .ok_or(LocationError::NoNearbyRegion)?;
        let province = self.parent_of(&regency);
        LocationRecord::new(
            Some(regency),
            province,
            fix.coordinate,
            LocationSource::Gps,
            self.now_ms(),
        )
    }

    fn set_manual(
        &self,
        regency: Option<Region>,
        province: Option<Region>,
        coordinates: Coordinate,
    ) -> Result<LocationRecord, LocationError> {
        let record = LocationRecord::new(
            regency,
            province,
            coordinates,
            LocationSource::Manual,
            self.now_ms(),
        )?;
        self.adopt(record.clone());
        Ok(record)
    }

    /// Make `record` active, persist it, and announce real changes.
    fn adopt(&self, record: LocationRecord) {
        let previous = {
            let mut state = self.lock_state();
            state.status = ResolverStatus::Resolved;
            state.current.replace(record.clone())
        };
        if matches!(
            record.source(),
            LocationSource::Gps | LocationSource::Manual
        ) {
            if !self.store.set(LOCATION_KEY, &record.to_persisted(), None) {
                warn!("location not persisted; continuing in memory");
            }
            self.store.touch_last_update(LEDGER_SUBSYSTEM);
        }
        let moved = previous
            .as_ref()
            .is_some_and(|previous| !previous.same_place(&record));
        if moved {
            self.announce_move(&record);
        }
    }

    fn announce_move(&self, record: &LocationRecord) {
        info!(location = %record.display_name(), source = ?record.source(), "location changed");
        self.events.publish(&SyncEvent::LocationChanged(record.clone()));
    }

    fn manual_record(&self) -> Option<LocationRecord> {
        if let Some(current) = self.current() {
            return (current.source() == LocationSource::Manual).then_some(current);
        }
        let saved = self.load_saved()?;
        if saved.source() != LocationSource::Manual {
            return None;
        }
        self.adopt(saved.clone());
        Some(saved)
    }

    fn saved_or_default(&self) -> LocationRecord {
        if let Some(saved) = self.load_saved() {
            return match saved.source() {
                LocationSource::Manual => saved,
                _ => saved.with_source(LocationSource::Cached),
            };
        }
        self.default_record().unwrap_or_else(|| self.best_effort_record())
    }

    fn load_saved(&self) -> Option<LocationRecord> {
        let persisted: PersistedLocation = self.store.get(LOCATION_KEY)?;
        let regency = persisted
            .regency_id
            .as_deref()
            .and_then(|id| self.regions.regency(id));
        let province = persisted
            .province_id
            .as_deref()
            .and_then(|id| self.regions.province(id))
            .or_else(|| regency.as_ref().and_then(|regency| self.parent_of(regency)));
        match LocationRecord::new(
            regency,
            province,
            persisted.coordinates,
            persisted.source,
            persisted.timestamp,
        ) {
            Ok(record) => Some(record),
            Err(_) => {
                warn!("saved location references unknown regions; ignoring it");
                None
            }
        }
    }

    fn default_record(&self) -> Option<LocationRecord> {
        let id = self.config.default_region_id.as_str();
        let (regency, province) = match self.regions.regency(id) {
            Some(regency) => {
                let province = self.parent_of(&regency);
                (Some(regency), province)
            }
            None => (None, Some(self.regions.province(id)?)),
        };
        let coordinates = regency
            .as_ref()
            .or(province.as_ref())
            .map_or(self.config.default_coordinate, |region| region.coordinates);
        LocationRecord::new(
            regency,
            province,
            coordinates,
            LocationSource::Default,
            self.now_ms(),
        )
        .ok()
    }

    /// Synthetic record for when even the default region is missing.
    fn best_effort_record(&self) -> LocationRecord {
        warn!(
            default_region_id = %self.config.default_region_id,
            "default region missing from dataset; using configured coordinates"
        );
        let region = Region {
            id: self.config.default_region_id.clone(),
            name: "Default location".to_owned(),
            parent_id: None,
            coordinates: self.config.default_coordinate,
        };
        LocationRecord::from_regency(region, LocationSource::Default, self.now_ms())
    }

    fn parent_of(&self, regency: &Region) -> Option<Region> {
        regency
            .parent_id
            .as_deref()
            .and_then(|id| self.regions.province(id))
    }

    fn set_status(&self, status: ResolverStatus) {
        self.lock_state().status = status;
    }

    fn lock_state(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> i64 {
        self.clock.utc().timestamp_millis()
    }
}

/// Running device watch. Call [`LocationFollow::release`] to stop it.
pub struct LocationFollow {
    watch: Option<WatchId>,
    geolocation: Arc<dyn GeolocationProvider>,
    task: JoinHandle<()>,
}

impl LocationFollow {
    /// Watch id registered with the provider.
    pub fn watch_id(&self) -> Option<WatchId> {
        self.watch
    }

    /// Clear the watch by id and stop applying fixes.
    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(watch) = self.watch.take() {
            self.geolocation.clear_watch(watch);
            self.task.abort();
            debug!(watch = watch.0, "location watch released");
        }
    }
}

impl Drop for LocationFollow {
    fn drop(&mut self) {
        if self.watch.is_some() {
            warn!("location watch dropped without release; clearing it");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests;
