//! Driven port for named HTTP response caches.
//!
//! Caches are addressed by name (for example `prayer-times-v1-api`) and
//! entries by their normalised request URL.

use async_trait::async_trait;

use super::{HttpResponse, define_port_error};

define_port_error! {
    /// Errors surfaced by response cache adapters.
    pub enum ResponseCacheError {
        /// Underlying storage failed.
        Backend { message: String } => "response cache backend failed: {message}",
        /// Stored entry could not be encoded or decoded.
        Serialization { message: String } => "response cache entry invalid: {message}",
    }
}

/// Port for storing and replaying HTTP responses.
#[async_trait]
pub trait ResponseCacheStore: Send + Sync {
    /// Fetch the response stored under `key` in `cache`.
    async fn lookup(&self, cache: &str, key: &str)
    -> Result<Option<HttpResponse>, ResponseCacheError>;

    /// Store `response` under `key`, replacing any previous entry.
    async fn put(
        &self,
        cache: &str,
        key: &str,
        response: &HttpResponse,
    ) -> Result<(), ResponseCacheError>;

    /// List the keys held by `cache`. Unknown caches have no keys.
    async fn keys(&self, cache: &str) -> Result<Vec<String>, ResponseCacheError>;

    /// List every cache name.
    async fn cache_names(&self) -> Result<Vec<String>, ResponseCacheError>;

    /// Delete a whole cache, returning whether it existed.
    async fn delete_cache(&self, cache: &str) -> Result<bool, ResponseCacheError>;
}
