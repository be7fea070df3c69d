//! Outbound adapters implementing the domain ports.
//!
//! - **http**: `reqwest` transport for the prayer API and static assets
//! - **storage**: in-memory and file-backed key-value storage
//! - **response_cache**: in-memory and directory-backed HTTP response caches
//! - **region_catalogue**: region lookups over the `region-data` catalogue
//! - **geolocation** / **connectivity**: device capability stand-ins
//!
//! Adapters translate between infrastructure and domain types. They contain
//! no freshness or failover logic.

mod atomic_io;
pub mod connectivity;
pub mod geolocation;
pub mod http;
pub mod region_catalogue;
pub mod response_cache;
pub mod storage;
