//! Driven port for device geolocation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::define_port_error;
use crate::domain::Coordinate;

/// One position fix reported by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    /// Reported position.
    pub coordinate: Coordinate,
    /// Horizontal accuracy in metres, when the platform reports one.
    pub accuracy_m: Option<f64>,
}

impl GeoFix {
    /// Build a fix without an accuracy estimate.
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy_m: None,
        }
    }
}

/// Handle for a running position watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

define_port_error! {
    /// Errors surfaced by geolocation providers.
    pub enum GeolocationError {
        /// The platform has no geolocation capability.
        Unsupported => "geolocation is not supported",
        /// The user refused location access.
        PermissionDenied => "geolocation permission denied",
        /// The provider did not produce a fix in time.
        Timeout => "geolocation timed out",
        /// The provider failed to determine a position.
        PositionUnavailable { message: String } => "position unavailable: {message}",
    }
}

/// Port for one-shot and continuous device positioning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// Whether the platform exposes geolocation at all.
    fn is_supported(&self) -> bool;

    /// Request a single high-accuracy fix, giving up after `timeout`.
    async fn current_position(&self, timeout: Duration) -> Result<GeoFix, GeolocationError>;

    /// Start streaming fixes into `sink` until [`Self::clear_watch`] is called.
    fn watch_position(&self, sink: UnboundedSender<GeoFix>) -> Result<WatchId, GeolocationError>;

    /// Stop a watch started by [`Self::watch_position`]. Unknown ids are ignored.
    fn clear_watch(&self, id: WatchId);
}
