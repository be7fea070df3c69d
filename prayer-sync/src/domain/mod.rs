//! Domain orchestration and value types.
//!
//! Purpose: keep every decision about freshness, failover, and location
//! priority in one adapter-agnostic layer. Adapters live in
//! [`crate::outbound`] and are injected through the traits in [`ports`].
//!
//! Public surface:
//! - `ResilientFetcher`: ordered endpoint failover for the prayer API.
//! - `ExpiringStore`: TTL-aware key-value store over a storage port.
//! - `LocationResolver`: GPS → saved → default location priority chain.
//! - `ScheduleOrchestrator`: memory → cache → network schedule reads.
//! - `OfflineCacheProxy`: per-resource-class caching strategies.
//! - `EventBus`, `CountdownTicker`, `SyncSession`: wiring.

pub mod coordinate;
pub mod countdown;
pub mod error;
pub mod events;
pub mod expiring_store;
pub mod fetch;
pub mod location;
pub mod offline_proxy;
pub mod ports;
pub mod schedule;
pub mod session;

pub use self::coordinate::{Coordinate, CoordinateError, format_coordinate, round_coordinate};
pub use self::countdown::{CountdownHandle, CountdownSource, CountdownTicker};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::events::{EventBus, SubscriberError, SubscriptionId, SyncEvent, SyncEventKind};
pub use self::expiring_store::{CacheEntry, ExpiringStore};
pub use self::fetch::{EndpointHealth, FetchConfig, ResilientFetcher};
pub use self::location::{
    LocationError, LocationFollow, LocationRecord, LocationResolver, LocationSource, Region,
    ResolverConfig, ResolverStatus,
};
pub use self::offline_proxy::{
    ActivationOutcome, CacheClassStatus, CacheStatusReport, CachingStrategy, OfflineCacheProxy,
    ProxyCommand, ProxyConfig, ProxyError, ProxyReply, ResourceClass, classify,
    normalized_cache_key,
};
pub use self::schedule::{
    CurrentPrayer, HijriDate, NextPrayer, PrayerKey, PrayerSchedule, PrayerTime, PrayerTiming,
    Remaining, ScheduleConfig, ScheduleDate, ScheduleError, ScheduleOrchestrator, ScheduleOrigin,
    TimingSource, current_prayer, derive_imsak, next_prayer,
};
pub use self::session::{SessionConfig, SessionPorts, StartupReport, SyncSession};

/// Convenient domain result alias.
pub type DomainResult<T> = Result<T, Error>;
