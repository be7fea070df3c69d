//! Offline cache proxy sitting between the fetch layer and the network.
//!
//! Every request is classified into a [`ResourceClass`] whose strategy is
//! fixed:
//!
//! | Class | Strategy |
//! |---|---|
//! | `Api` | stale-while-revalidate on a coordinate-normalised key |
//! | `Data`, `Static` | cache-first |
//! | `Scripts` | network-first |
//! | `Pages` | network-first, then the offline document |
//!
//! Caches are named `{namespace}-{version}-{class}`. A marker in
//! `{namespace}-meta` records the active version; [`OfflineCacheProxy::activate`]
//! deletes the caches of every other version when it changes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::fetch::DEFAULT_ENDPOINTS;
use crate::domain::ports::{
    HttpRequest, HttpResponse, HttpTransport, ResponseCacheError, ResponseCacheStore,
    TransportError,
};
use crate::domain::schedule::api_date;

mod classify;
mod control;

pub use classify::{CachingStrategy, ResourceClass, classify, normalized_cache_key};
use classify::{manual_key, manual_key_for};
pub use control::{
    ActivationOutcome, CacheClassStatus, CacheStatusReport, ProxyCommand, ProxyReply,
};

const VERSION_KEY: &str = "version";

/// Failures of proxy lifecycle and control operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Network(#[from] TransportError),
    #[error(transparent)]
    Cache(#[from] ResponseCacheError),
    /// A control command carried an unusable argument.
    #[error("invalid proxy command: {reason}")]
    InvalidCommand { reason: String },
}

/// Proxy naming and routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Prefix shared by every cache this proxy owns.
    pub namespace: String,
    /// Version marker; changing it invalidates older caches.
    pub version: String,
    /// Hosts classified as the prayer API.
    pub api_hosts: Vec<String>,
    /// Path of the document served when a navigation fails offline.
    pub offline_document: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            namespace: "prayer-times".to_owned(),
            version: "v1".to_owned(),
            api_hosts: DEFAULT_ENDPOINTS
                .iter()
                .filter_map(|raw| Url::parse(raw).ok())
                .filter_map(|url| url.host_str().map(str::to_owned))
                .collect(),
            offline_document: "/offline.html".to_owned(),
        }
    }
}

impl ProxyConfig {
    /// Cache name for a resource class at the active version.
    pub fn cache_name(&self, class: ResourceClass) -> String {
        format!("{}-{}-{}", self.namespace, self.version, class)
    }

    /// Cache holding the version marker.
    pub fn meta_cache(&self) -> String {
        format!("{}-meta", self.namespace)
    }

    fn owns(&self, cache: &str) -> bool {
        cache
            .strip_prefix(&self.namespace)
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Caching transport wrapping the real network.
pub struct OfflineCacheProxy {
    network: Arc<dyn HttpTransport>,
    caches: Arc<dyn ResponseCacheStore>,
    config: ProxyConfig,
    revalidations: Mutex<JoinSet<()>>,
}

impl OfflineCacheProxy {
    pub fn new(
        network: Arc<dyn HttpTransport>,
        caches: Arc<dyn ResponseCacheStore>,
        config: ProxyConfig,
    ) -> Self {
        Self {
            network,
            caches,
            config,
            revalidations: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Precache shell assets. The offline document is always included.
    ///
    /// All URLs are fetched before anything is stored, so a failed install
    /// leaves the caches untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Network`] when any asset cannot be fetched
    /// successfully and [`ProxyError::Cache`] when storing fails.
    pub async fn install(&self, origin: &Url, assets: &[&str]) -> Result<usize, ProxyError> {
        let offline_document = self.offline_document_url(origin)?;
        let mut urls = assets
            .iter()
            .map(|asset| origin.join(asset))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| TransportError::transport(format!("invalid asset path: {err}")))?;
        if !urls.contains(&offline_document) {
            urls.push(offline_document.clone());
        }

        let mut fetched = Vec::with_capacity(urls.len());
        for url in urls {
            let request = HttpRequest::get(url);
            let response = self.network.send(&request).await?;
            if !response.is_success() {
                return Err(TransportError::transport(format!(
                    "{} answered HTTP {}",
                    request.url, response.status
                ))
                .into());
            }
            let class = if request.url == offline_document {
                ResourceClass::Pages
            } else {
                classify(&self.config, &request)
            };
            fetched.push((class, normalized_cache_key(&request.url), response));
        }

        for (class, key, response) in &fetched {
            self.caches
                .put(&self.config.cache_name(*class), key, response)
                .await?;
        }
        info!(assets = fetched.len(), version = %self.config.version, "offline shell precached");
        Ok(fetched.len())
    }

    /// Compare the stored version marker with the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Cache`] when the marker or caches cannot be
    /// read, written, or deleted.
    pub async fn activate(&self) -> Result<ActivationOutcome, ProxyError> {
        let meta = self.config.meta_cache();
        let stored = self
            .caches
            .lookup(&meta, VERSION_KEY)
            .await?
            .map(|response| String::from_utf8_lossy(&response.body).into_owned());

        let outcome = match stored {
            Some(previous) if previous == self.config.version => {
                debug!(version = %previous, "cache version unchanged");
                return Ok(ActivationOutcome::Unchanged);
            }
            Some(previous) => {
                let current: Vec<String> = ResourceClass::ALL
                    .into_iter()
                    .map(|class| self.config.cache_name(class))
                    .collect();
                let deleted = self
                    .delete_owned_caches(|name| !current.iter().any(|keep| keep == name))
                    .await?;
                info!(
                    previous = %previous,
                    version = %self.config.version,
                    deleted = deleted.len(),
                    "cache version changed; older caches deleted"
                );
                ActivationOutcome::Invalidated { previous, deleted }
            }
            None => ActivationOutcome::Installed,
        };

        let marker = HttpResponse::new(200, self.config.version.clone().into_bytes())
            .with_content_type("text/plain");
        self.caches.put(&meta, VERSION_KEY, &marker).await?;
        Ok(outcome)
    }

    /// Execute a control-channel command.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidCommand`] for a manual entry whose
    /// payload is not a JSON object and [`ProxyError::Cache`] when the
    /// caches fail.
    pub async fn handle_command(&self, command: ProxyCommand) -> Result<ProxyReply, ProxyError> {
        match command {
            ProxyCommand::InvalidateAllCaches => {
                let deleted = self.delete_owned_caches(|_| true).await?;
                info!(deleted = deleted.len(), "all caches invalidated on request");
                Ok(ProxyReply::Invalidated { deleted })
            }
            ProxyCommand::CacheEntry { date, payload } => {
                if !payload.is_object() {
                    return Err(ProxyError::InvalidCommand {
                        reason: format!("payload for {date} must be a JSON object"),
                    });
                }
                let key = manual_key(&api_date(date));
                self.caches
                    .put(
                        &self.config.cache_name(ResourceClass::Api),
                        &key,
                        &HttpResponse::json(200, &payload),
                    )
                    .await?;
                debug!(key = %key, "manual schedule entry cached");
                Ok(ProxyReply::Cached { key })
            }
            ProxyCommand::ReportStatus => Ok(ProxyReply::Status(self.status().await?)),
        }
    }

    /// Per-class entry counts and keys at the active version.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Cache`] when a cache cannot be listed.
    pub async fn status(&self) -> Result<CacheStatusReport, ProxyError> {
        let mut classes = Vec::with_capacity(ResourceClass::ALL.len());
        for class in ResourceClass::ALL {
            let cache_name = self.config.cache_name(class);
            let mut keys = self.caches.keys(&cache_name).await?;
            keys.sort();
            classes.push(CacheClassStatus {
                class,
                cache_name,
                entries: keys.len(),
                keys,
            });
        }
        Ok(CacheStatusReport {
            version: self.config.version.clone(),
            classes,
        })
    }

    /// Wait for outstanding background revalidations; returns how many ran.
    pub async fn flush_background(&self) -> usize {
        let mut pending = std::mem::take(&mut *self.lock_revalidations());
        let mut completed = 0;
        while let Some(outcome) = pending.join_next().await {
            if let Err(error) = outcome {
                warn!(error = %error, "revalidation task aborted");
            }
            completed += 1;
        }
        completed
    }

    async fn stale_while_revalidate(
        &self,
        class: ResourceClass,
        request: &HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let cache = self.config.cache_name(class);
        let key = normalized_cache_key(&request.url);
        if let Some(cached) = self.lookup(&cache, &key).await {
            debug!(key = %key, "serving cached response; revalidating");
            self.spawn_revalidation(cache, key, request.clone());
            return Ok(cached);
        }

        match self.network.send(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(&cache, &key, &response).await;
                }
                Ok(response)
            }
            Err(error) => {
                warn!(error = %error, url = %request.url, "API request failed with no cached copy");
                if let Some(manual) = self.manual_entry(&cache, &request.url).await {
                    return Ok(manual);
                }
                Ok(service_unavailable(&error))
            }
        }
    }

    async fn cache_first(
        &self,
        class: ResourceClass,
        request: &HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let cache = self.config.cache_name(class);
        let key = normalized_cache_key(&request.url);
        if let Some(cached) = self.lookup(&cache, &key).await {
            debug!(key = %key, "cache hit");
            return Ok(cached);
        }
        debug!(key = %key, "cache miss");

        match self.network.send(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(&cache, &key, &response).await;
                }
                Ok(response)
            }
            Err(error) => {
                if let Some(fallback) = self.lookup_any(&key).await {
                    return Ok(fallback);
                }
                Err(error)
            }
        }
    }

    async fn network_first(
        &self,
        class: ResourceClass,
        request: &HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let cache = self.config.cache_name(class);
        let key = normalized_cache_key(&request.url);
        let outcome = self.network.send(request).await;
        if let Ok(response) = &outcome {
            if response.is_success() {
                self.store(&cache, &key, response).await;
                return outcome;
            }
        }

        if let Some(cached) = self.lookup(&cache, &key).await {
            debug!(key = %key, "network failed; serving cached copy");
            return Ok(cached);
        }
        if class == ResourceClass::Pages {
            if let Some(document) = self.offline_document_for(&request.url).await {
                info!(url = %request.url, "serving offline document");
                return Ok(document);
            }
        }
        if class == ResourceClass::Api {
            if let Err(error) = &outcome {
                return Ok(service_unavailable(error));
            }
        }
        outcome
    }

    fn spawn_revalidation(&self, cache: String, key: String, request: HttpRequest) {
        let network = Arc::clone(&self.network);
        let caches = Arc::clone(&self.caches);
        let mut tasks = self.lock_revalidations();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match network.send(&request).await {
                Ok(response) if response.is_success() => {
                    if let Err(error) = caches.put(&cache, &key, &response).await {
                        warn!(error = %error, key = %key, "failed to store revalidated response");
                    } else {
                        debug!(key = %key, "cached response revalidated");
                    }
                }
                Ok(response) => {
                    warn!(status = response.status, key = %key, "revalidation rejected; keeping stale entry");
                }
                Err(error) => {
                    warn!(error = %error, key = %key, "revalidation failed; keeping stale entry");
                }
            }
        });
    }

    async fn lookup(&self, cache: &str, key: &str) -> Option<HttpResponse> {
        match self.caches.lookup(cache, key).await {
            Ok(hit) => hit,
            Err(error) => {
                warn!(error = %error, cache, key, "cache lookup failed; treating as miss");
                None
            }
        }
    }

    async fn lookup_any(&self, key: &str) -> Option<HttpResponse> {
        for class in ResourceClass::ALL {
            if let Some(hit) = self.lookup(&self.config.cache_name(class), key).await {
                return Some(hit);
            }
        }
        None
    }

    async fn store(&self, cache: &str, key: &str, response: &HttpResponse) {
        if let Err(error) = self.caches.put(cache, key, response).await {
            warn!(error = %error, cache, key, "failed to cache response");
        }
    }

    async fn manual_entry(&self, cache: &str, url: &Url) -> Option<HttpResponse> {
        let key = manual_key_for(url)?;
        let hit = self.lookup(cache, &key).await?;
        info!(key = %key, "serving manually cached schedule");
        Some(hit)
    }

    async fn offline_document_for(&self, url: &Url) -> Option<HttpResponse> {
        let document = self.offline_document_url(url).ok()?;
        self.lookup(
            &self.config.cache_name(ResourceClass::Pages),
            &normalized_cache_key(&document),
        )
        .await
    }

    fn offline_document_url(&self, base: &Url) -> Result<Url, TransportError> {
        base.join(&self.config.offline_document).map_err(|err| {
            TransportError::transport(format!(
                "invalid offline document {}: {err}",
                self.config.offline_document
            ))
        })
    }

    async fn delete_owned_caches(
        &self,
        select: impl Fn(&str) -> bool + Send,
    ) -> Result<Vec<String>, ProxyError> {
        let meta = self.config.meta_cache();
        let mut deleted = Vec::new();
        for name in self.caches.cache_names().await? {
            if name == meta || !self.config.owns(&name) || !select(&name) {
                continue;
            }
            if self.caches.delete_cache(&name).await? {
                deleted.push(name);
            }
        }
        deleted.sort();
        Ok(deleted)
    }

    fn lock_revalidations(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.revalidations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HttpTransport for OfflineCacheProxy {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let class = classify(&self.config, request);
        match class.strategy() {
            CachingStrategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(class, request).await
            }
            CachingStrategy::CacheFirst => self.cache_first(class, request).await,
            CachingStrategy::NetworkFirst => self.network_first(class, request).await,
        }
    }
}

/// Structured answer for API requests that neither network nor cache could
/// satisfy.
fn service_unavailable(error: &TransportError) -> HttpResponse {
    HttpResponse::json(
        503,
        &json!({
            "code": 503,
            "status": "Service Unavailable",
            "data": "prayer times are unavailable offline and no cached copy exists",
            "offline": true,
            "reason": error.to_string(),
        }),
    )
}
