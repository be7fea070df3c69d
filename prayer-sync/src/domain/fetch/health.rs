//! Per-endpoint health bookkeeping and candidate selection.

use serde::Serialize;

/// Health of one configured endpoint. Process-lifetime only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointHealth {
    /// Failures since the last success.
    pub failure_count: u32,
    /// Epoch milliseconds of the most recent failure.
    pub last_failure_at: Option<i64>,
    /// Cleared once `failure_count` reaches the retry threshold.
    pub healthy: bool,
}

impl Default for EndpointHealth {
    fn default() -> Self {
        Self {
            failure_count: 0,
            last_failure_at: None,
            healthy: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct EndpointPool {
    health: Vec<EndpointHealth>,
    start: usize,
    failure_threshold: u32,
}

impl EndpointPool {
    pub(super) fn new(endpoint_count: usize, failure_threshold: u32) -> Self {
        Self {
            health: vec![EndpointHealth::default(); endpoint_count],
            start: 0,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Pick up to `per_attempt` endpoints, rotating from the last success.
    ///
    /// Healthy endpoints come first; unhealthy ones only fill remaining slots
    /// so an outage of every endpoint still produces attempts.
    pub(super) fn candidates(&self, per_attempt: usize) -> Vec<usize> {
        let count = self.health.len();
        let wanted = per_attempt.max(1).min(count);
        let rotation = || (0..count).map(|offset| (self.start + offset) % count);

        let mut picked: Vec<usize> = rotation()
            .filter(|index| self.health[*index].healthy)
            .take(wanted)
            .collect();
        for index in rotation() {
            if picked.len() >= wanted {
                break;
            }
            if !picked.contains(&index) {
                picked.push(index);
            }
        }
        picked
    }

    pub(super) fn record_success(&mut self, index: usize) {
        if let Some(entry) = self.health.get_mut(index) {
            *entry = EndpointHealth::default();
            self.start = index;
        }
    }

    pub(super) fn record_failure(&mut self, index: usize, now_ms: i64) {
        if let Some(entry) = self.health.get_mut(index) {
            entry.failure_count = entry.failure_count.saturating_add(1);
            entry.last_failure_at = Some(now_ms);
            entry.healthy = entry.failure_count < self.failure_threshold;
        }
    }

    pub(super) fn snapshot(&self) -> Vec<EndpointHealth> {
        self.health.clone()
    }
}
