//! Geolocation adapters for hosts without a positioning API.
//!
//! A CLI has no device GPS, so the "fix" is either configured coordinates
//! ([`FixedGeolocation`]) or absent ([`UnsupportedGeolocation`]).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::domain::ports::{GeoFix, GeolocationError, GeolocationProvider, WatchId};

/// Provider reporting a settable position.
#[derive(Debug)]
pub struct FixedGeolocation {
    position: Mutex<Result<GeoFix, GeolocationError>>,
    watches: Mutex<BTreeMap<u64, UnboundedSender<GeoFix>>>,
    next_watch: AtomicU64,
}

impl FixedGeolocation {
    /// Provider that always reports `fix`.
    pub fn new(fix: GeoFix) -> Self {
        Self::with_result(Ok(fix))
    }

    /// Provider that always fails with `error`.
    pub fn failing(error: GeolocationError) -> Self {
        Self::with_result(Err(error))
    }

    fn with_result(position: Result<GeoFix, GeolocationError>) -> Self {
        Self {
            position: Mutex::new(position),
            watches: Mutex::new(BTreeMap::new()),
            next_watch: AtomicU64::new(1),
        }
    }

    /// Change the reported position and notify active watches.
    pub fn move_to(&self, fix: GeoFix) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = Ok(fix);
        self.lock_watches()
            .retain(|_, sink| sink.send(fix).is_ok());
    }

    /// Make subsequent one-shot requests fail.
    pub fn fail_with(&self, error: GeolocationError) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = Err(error);
    }

    /// Number of watches not yet cleared.
    pub fn active_watches(&self) -> usize {
        self.lock_watches().len()
    }

    fn lock_watches(&self) -> MutexGuard<'_, BTreeMap<u64, UnboundedSender<GeoFix>>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GeolocationProvider for FixedGeolocation {
    fn is_supported(&self) -> bool {
        true
    }

    async fn current_position(&self, _timeout: Duration) -> Result<GeoFix, GeolocationError> {
        self.position
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn watch_position(&self, sink: UnboundedSender<GeoFix>) -> Result<WatchId, GeolocationError> {
        let id = self.next_watch.fetch_add(1, Ordering::Relaxed);
        self.lock_watches().insert(id, sink);
        Ok(WatchId(id))
    }

    fn clear_watch(&self, id: WatchId) {
        self.lock_watches().remove(&id.0);
    }
}

/// Provider for platforms without geolocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedGeolocation;

#[async_trait]
impl GeolocationProvider for UnsupportedGeolocation {
    fn is_supported(&self) -> bool {
        false
    }

    async fn current_position(&self, _timeout: Duration) -> Result<GeoFix, GeolocationError> {
        Err(GeolocationError::unsupported())
    }

    fn watch_position(&self, _sink: UnboundedSender<GeoFix>) -> Result<WatchId, GeolocationError> {
        Err(GeolocationError::unsupported())
    }

    fn clear_watch(&self, _id: WatchId) {}
}
