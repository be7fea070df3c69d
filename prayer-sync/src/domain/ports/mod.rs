//! Driven ports implemented by outbound adapters.
//!
//! Suspending operations (network, geolocation, response cache) are
//! `async_trait` traits; persistent key-value storage is synchronous but
//! fallible, matching how the platform storage behaves.

mod connectivity;
mod geolocation;
mod http_transport;
mod macros;
mod region_lookup;
mod response_cache;
mod schedule_source;
mod storage_backend;

pub(crate) use macros::define_port_error;

pub use connectivity::ConnectivityProbe;
pub use geolocation::{GeoFix, GeolocationError, GeolocationProvider, WatchId};
pub use http_transport::{HttpRequest, HttpResponse, HttpTransport, RequestMode, TransportError};
pub use region_lookup::RegionLookup;
pub use response_cache::{ResponseCacheError, ResponseCacheStore};
pub use schedule_source::{FetchError, ScheduleQuery, ScheduleSource};
pub use storage_backend::{StorageBackend, StorageError};

#[cfg(test)]
pub use geolocation::MockGeolocationProvider;
