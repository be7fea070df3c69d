//! In-process response cache.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::ports::{HttpResponse, ResponseCacheError, ResponseCacheStore};

type Caches = BTreeMap<String, BTreeMap<String, HttpResponse>>;

/// Response cache held in memory; lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    caches: RwLock<Caches>,
    failing: AtomicBool,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ResponseCacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ResponseCacheError::backend("cache storage unavailable"));
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Caches> {
        self.caches.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Caches> {
        self.caches.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ResponseCacheStore for MemoryResponseCache {
    async fn lookup(
        &self,
        cache: &str,
        key: &str,
    ) -> Result<Option<HttpResponse>, ResponseCacheError> {
        self.check()?;
        Ok(self
            .read()
            .get(cache)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        cache: &str,
        key: &str,
        response: &HttpResponse,
    ) -> Result<(), ResponseCacheError> {
        self.check()?;
        self.write()
            .entry(cache.to_owned())
            .or_default()
            .insert(key.to_owned(), response.clone());
        Ok(())
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>, ResponseCacheError> {
        self.check()?;
        Ok(self
            .read()
            .get(cache)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn cache_names(&self) -> Result<Vec<String>, ResponseCacheError> {
        self.check()?;
        Ok(self.read().keys().cloned().collect())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool, ResponseCacheError> {
        self.check()?;
        Ok(self.write().remove(cache).is_some())
    }
}
