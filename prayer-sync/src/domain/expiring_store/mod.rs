//! Key-value store with per-entry TTL over a [`StorageBackend`].
//!
//! Entries are wrapped as [`CacheEntry`] JSON with the write time in epoch
//! milliseconds. Expiry is lazy: readers delete what they find expired and
//! [`ExpiringStore::clean_expired`] sweeps opportunistically after writes.
//! When the backend reports itself unavailable every write returns `false`
//! and every read returns the default, so callers fall back to memory-only
//! operation without special handling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::ports::{StorageBackend, StorageError};

const LAST_UPDATE_KEY: &str = "last_update";

/// Stored envelope around a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// Wrapped value.
    pub value: T,
    /// Write time in epoch milliseconds.
    pub stored_at: i64,
    /// Lifetime in milliseconds; `None` never expires.
    pub ttl_ms: Option<i64>,
}

impl<T> CacheEntry<T> {
    /// Whether the entry is logically absent at `now_ms`.
    ///
    /// An entry is alive only while `now - stored_at < ttl`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.ttl_ms
            .is_some_and(|ttl| now_ms.saturating_sub(self.stored_at) >= ttl)
    }
}

/// Namespaced TTL store.
pub struct ExpiringStore {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    namespace: String,
}

impl ExpiringStore {
    /// Wrap `backend`, prefixing every key with `"{namespace}:"`.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            clock,
            namespace: namespace.into(),
        }
    }

    /// Probe the backend.
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Store `value` under `key` with an optional lifetime.
    ///
    /// A quota failure triggers one [`Self::clean_expired`] pass and a single
    /// retry. Returns whether the value was persisted.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        if !self.is_available() {
            return false;
        }
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                warn!(key, error = %error, "value is not serialisable; skipping write");
                return false;
            }
        };
        let entry = CacheEntry {
            value,
            stored_at: self.now_ms(),
            ttl_ms: ttl.map(duration_ms),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(key, error = %error, "failed to encode cache entry");
                return false;
            }
        };

        let full_key = self.full_key(key);
        match self.backend.set_item(&full_key, &raw) {
            Ok(()) => true,
            Err(StorageError::QuotaExceeded { message }) => {
                warn!(key, reason = %message, "storage quota exceeded; cleaning expired entries");
                let removed = self.clean_expired();
                match self.backend.set_item(&full_key, &raw) {
                    Ok(()) => {
                        debug!(key, removed, "write succeeded after cleanup");
                        true
                    }
                    Err(error) => {
                        warn!(key, removed, error = %error, "write failed after cleanup");
                        false
                    }
                }
            }
            Err(error) => {
                warn!(key, error = %error, "storage write failed");
                false
            }
        }
    }

    /// Read a live value, deleting it when expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.read_entry(key)?;
        if entry.is_expired(self.now_ms()) {
            debug!(key, "cache entry expired");
            self.remove(key);
            return None;
        }
        decode_value(key, entry.value)
    }

    /// Read a live value or return `default`.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Read a value regardless of its TTL (offline bypass).
    pub fn get_ignoring_ttl<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.read_entry(key)?;
        decode_value(key, entry.value)
    }

    /// Whether a live entry exists under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get::<Value>(key).is_some()
    }

    /// Delete `key`. Returns whether the backend accepted the removal.
    pub fn remove(&self, key: &str) -> bool {
        if !self.is_available() {
            return false;
        }
        match self.backend.remove_item(&self.full_key(key)) {
            Ok(()) => true,
            Err(error) => {
                warn!(key, error = %error, "storage remove failed");
                false
            }
        }
    }

    /// Delete every entry whose key starts with `prefix`; returns the count.
    pub fn clear_by_prefix(&self, prefix: &str) -> usize {
        let full_prefix = self.full_key(prefix);
        self.namespaced_keys()
            .into_iter()
            .filter(|key| key.starts_with(&full_prefix))
            .filter(|key| self.remove_raw(key))
            .count()
    }

    /// Delete every expired or unreadable entry in the namespace.
    pub fn clean_expired(&self) -> usize {
        let now = self.now_ms();
        let mut removed = 0;
        for key in self.namespaced_keys() {
            let stale = match self.backend.get_item(&key) {
                Ok(Some(raw)) => serde_json::from_str::<CacheEntry<Value>>(&raw)
                    .map(|entry| entry.is_expired(now))
                    .unwrap_or(true),
                Ok(None) => false,
                Err(error) => {
                    warn!(key, error = %error, "storage read failed during sweep");
                    false
                }
            };
            if stale && self.remove_raw(&key) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Record "now" as the last update time for `subsystem`.
    pub fn touch_last_update(&self, subsystem: &str) -> bool {
        let mut ledger: BTreeMap<String, i64> = self.get_or(LAST_UPDATE_KEY, BTreeMap::new());
        ledger.insert(subsystem.to_owned(), self.now_ms());
        self.set(LAST_UPDATE_KEY, &ledger, None)
    }

    /// Last update time for `subsystem` in epoch milliseconds.
    pub fn last_update(&self, subsystem: &str) -> Option<i64> {
        self.get::<BTreeMap<String, i64>>(LAST_UPDATE_KEY)?
            .get(subsystem)
            .copied()
    }

    fn read_entry(&self, key: &str) -> Option<CacheEntry<Value>> {
        if !self.is_available() {
            return None;
        }
        let raw = match self.backend.get_item(&self.full_key(key)) {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(key, error = %error, "storage read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(key, error = %error, "discarding corrupt cache entry");
                self.remove(key);
                None
            }
        }
    }

    fn namespaced_keys(&self) -> Vec<String> {
        if !self.is_available() {
            return Vec::new();
        }
        let prefix = self.full_key("");
        match self.backend.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| key.starts_with(&prefix))
                .collect(),
            Err(error) => {
                warn!(error = %error, "storage key listing failed");
                Vec::new()
            }
        }
    }

    fn remove_raw(&self, full_key: &str) -> bool {
        self.backend.remove_item(full_key).is_ok()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    fn now_ms(&self) -> i64 {
        self.clock.utc().timestamp_millis()
    }
}

fn decode_value<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, error = %error, "cache entry has unexpected shape");
            None
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
