//! Driven port for retrieving prayer-time API payloads.
//!
//! The orchestrator depends on this port rather than on the concrete
//! failover fetcher so its read-path can be exercised with scripted
//! payloads.

use async_trait::async_trait;
use serde_json::Value;

use super::define_port_error;

/// Relative API request: path below the endpoint base plus query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleQuery {
    /// Path relative to the endpoint base, e.g. `timings/01-03-2026`.
    pub path: String,
    /// Query parameters in insertion order.
    pub params: Vec<(String, String)>,
}

impl ScheduleQuery {
    /// Start a query for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }
}

define_port_error! {
    /// Errors surfaced by the resilient fetch layer.
    pub enum FetchError {
        /// Every attempted endpoint failed; `message` describes the last failure.
        AllEndpointsFailed { attempted: usize, message: String } =>
            "all {attempted} endpoint attempts failed: {message}",
        /// Every attempted endpoint exceeded the request timeout.
        TimedOut { attempted: usize, message: String } =>
            "all {attempted} endpoint attempts timed out: {message}",
        /// The request could not be constructed.
        InvalidRequest { message: String } => "invalid request: {message}",
    }
}

/// Port for fetching validated JSON payloads from the prayer-time API.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Fetch `query` and return the full response envelope.
    ///
    /// Implementations only return payloads whose envelope reports success
    /// (`code == 200`, `status == "OK"`).
    async fn fetch_json(&self, query: &ScheduleQuery) -> Result<Value, FetchError>;
}
