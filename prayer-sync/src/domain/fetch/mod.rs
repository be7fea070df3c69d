//! Ordered-endpoint failover for the prayer-time API.
//!
//! Each call tries at most [`FetchConfig::endpoints_per_attempt`] endpoints,
//! starting from the endpoint that last succeeded. Every attempt races the
//! transport against a fixed timeout; a request that loses the race keeps
//! running detached and its result is ignored.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mockable::Clock;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::ports::{
    FetchError, HttpRequest, HttpTransport, ScheduleQuery, ScheduleSource, TransportError,
};

mod health;

use health::EndpointPool;
pub use health::EndpointHealth;

/// Default mirrors of the prayer-time API.
pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "https://api.aladhan.com/v1",
    "https://aladhan.api.islamic.network/v1",
    "https://aladhan.api.alislam.ru/v1",
];

/// Failover behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Equivalent API base URLs in preference order.
    pub endpoints: Vec<Url>,
    /// Deadline for one endpoint attempt.
    pub request_timeout: Duration,
    /// Consecutive failures after which an endpoint is marked unhealthy.
    pub retry_attempts: u32,
    /// Endpoints tried per call.
    pub endpoints_per_attempt: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS
                .iter()
                .filter_map(|raw| Url::parse(raw).ok())
                .collect(),
            request_timeout: Duration::from_millis(8_000),
            retry_attempts: 3,
            endpoints_per_attempt: 2,
        }
    }
}

enum AttemptFailure {
    TimedOut(String),
    Failed(String),
}

/// Fetch layer with per-endpoint health tracking.
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    config: FetchConfig,
    pool: Mutex<EndpointPool>,
}

impl ResilientFetcher {
    /// Build a fetcher over `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>, config: FetchConfig) -> Self {
        let pool = EndpointPool::new(config.endpoints.len(), config.retry_attempts);
        Self {
            transport,
            clock,
            config,
            pool: Mutex::new(pool),
        }
    }

    /// GET `path` with `params` from the first endpoint that answers with a
    /// successful envelope.
    ///
    /// # Errors
    /// [`FetchError::AllEndpointsFailed`] carrying the last failure once every
    /// selected endpoint failed, [`FetchError::TimedOut`] when all of them
    /// timed out, [`FetchError::InvalidRequest`] when no URL can be built.
    pub async fn fetch_with_fallback(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Value, FetchError> {
        if self.config.endpoints.is_empty() {
            return Err(FetchError::invalid_request("no API endpoints configured"));
        }
        let candidates = self
            .lock_pool()
            .candidates(self.config.endpoints_per_attempt);

        let mut last_message = String::new();
        let mut timeouts = 0_usize;
        for &index in &candidates {
            let url = build_url(&self.config.endpoints[index], path, params)?;
            debug!(endpoint = index, url = %url, "attempting endpoint");
            match self.attempt(url).await {
                Ok(payload) => {
                    self.lock_pool().record_success(index);
                    return Ok(payload);
                }
                Err(failure) => {
                    let message = match failure {
                        AttemptFailure::TimedOut(message) => {
                            timeouts += 1;
                            message
                        }
                        AttemptFailure::Failed(message) => message,
                    };
                    warn!(endpoint = index, path, reason = %message, "endpoint attempt failed");
                    self.lock_pool()
                        .record_failure(index, self.clock.utc().timestamp_millis());
                    last_message = message;
                }
            }
        }

        let attempted = candidates.len();
        info!(attempted, path, "all endpoint attempts failed");
        if timeouts == attempted {
            Err(FetchError::timed_out(attempted, last_message))
        } else {
            Err(FetchError::all_endpoints_failed(attempted, last_message))
        }
    }

    /// Health of every configured endpoint, in configuration order.
    pub fn endpoint_health(&self) -> Vec<EndpointHealth> {
        self.lock_pool().snapshot()
    }

    /// Configured endpoints.
    pub fn endpoints(&self) -> &[Url] {
        &self.config.endpoints
    }

    async fn attempt(&self, url: Url) -> Result<Value, AttemptFailure> {
        let transport = Arc::clone(&self.transport);
        let request = HttpRequest::get(url);
        let in_flight = tokio::spawn(async move { transport.send(&request).await });

        let timeout = self.config.request_timeout;
        let response = match tokio::time::timeout(timeout, in_flight).await {
            Err(_) => {
                return Err(AttemptFailure::TimedOut(format!(
                    "no response within {}ms",
                    timeout.as_millis()
                )));
            }
            Ok(Err(join_error)) => return Err(AttemptFailure::Failed(join_error.to_string())),
            Ok(Ok(Err(TransportError::Timeout { message }))) => {
                return Err(AttemptFailure::TimedOut(message));
            }
            Ok(Ok(Err(error))) => return Err(AttemptFailure::Failed(error.to_string())),
            Ok(Ok(Ok(response))) => response,
        };

        if !response.is_success() {
            return Err(AttemptFailure::Failed(format!("HTTP {}", response.status)));
        }
        let payload: Value = serde_json::from_slice(&response.body)
            .map_err(|err| AttemptFailure::Failed(format!("invalid JSON body: {err}")))?;
        validate_envelope(&payload).map_err(AttemptFailure::Failed)?;
        Ok(payload)
    }

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, EndpointPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ScheduleSource for ResilientFetcher {
    async fn fetch_json(&self, query: &ScheduleQuery) -> Result<Value, FetchError> {
        self.fetch_with_fallback(&query.path, &query.params).await
    }
}

/// Reject envelopes whose `code`/`status` report an API-level failure.
fn validate_envelope(payload: &Value) -> Result<(), String> {
    let code = payload.get("code").and_then(Value::as_i64);
    let status = payload.get("status").and_then(Value::as_str);
    match (code, status) {
        (Some(200), Some("OK")) => Ok(()),
        _ => Err(format!(
            "API error code {} status {}",
            code.map_or_else(|| "missing".to_owned(), |code| code.to_string()),
            status.unwrap_or("missing")
        )),
    }
}

fn build_url(base: &Url, path: &str, params: &[(String, String)]) -> Result<Url, FetchError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FetchError::invalid_request(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

#[cfg(test)]
mod tests;
