//! Offline-resilient prayer-time synchronisation core.
//!
//! The crate merges a failover-aware client for the prayer-times API, a
//! TTL-aware key-value store, a location resolver, and an offline cache proxy
//! into one source of truth for today's schedule and the "next prayer"
//! countdown.

pub mod domain;
pub mod outbound;
pub mod settings;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
