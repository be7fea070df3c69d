//! Control-channel messages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ResourceClass;

/// Commands accepted by [`super::OfflineCacheProxy::handle_command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProxyCommand {
    /// Delete every cache under the proxy namespace.
    InvalidateAllCaches,
    /// Store a `timings` payload for `date` so it survives offline.
    #[serde(rename = "manually-cache-entry")]
    CacheEntry { date: NaiveDate, payload: Value },
    /// Report entry counts and keys per resource class.
    ReportStatus,
}

/// Answers to [`ProxyCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProxyReply {
    Invalidated { deleted: Vec<String> },
    Cached { key: String },
    Status(CacheStatusReport),
}

/// Result of [`super::OfflineCacheProxy::activate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationOutcome {
    /// No version marker existed; it has been written.
    Installed,
    /// The stored marker already matched.
    Unchanged,
    /// The marker changed; caches of other versions were deleted and the
    /// client must reload.
    Invalidated {
        previous: String,
        deleted: Vec<String>,
    },
}

/// Per-class cache summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheClassStatus {
    pub class: ResourceClass,
    pub cache_name: String,
    pub entries: usize,
    pub keys: Vec<String>,
}

/// Status answer for the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatusReport {
    pub version: String,
    pub classes: Vec<CacheClassStatus>,
}

impl CacheStatusReport {
    /// Entries across all classes.
    pub fn total_entries(&self) -> usize {
        self.classes.iter().map(|class| class.entries).sum()
    }
}
