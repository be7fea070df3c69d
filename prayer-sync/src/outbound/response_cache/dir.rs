//! Directory-backed response cache.
//!
//! Layout: one subdirectory per cache, one JSON file per entry named by the
//! SHA-256 of its key. Files hold `{ "key": ..., "response": ... }` so keys can
//! be listed without a separate index.

use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::ports::{HttpResponse, ResponseCacheError, ResponseCacheStore};
use crate::outbound::atomic_io::write_atomic;

const ENTRY_SUFFIX: &str = ".json";

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    response: HttpResponse,
}

/// Response cache persisted under a root directory.
#[derive(Debug)]
pub struct DirResponseCache {
    root: Dir,
    // Serialises directory mutation so list/delete never race a put.
    guard: Mutex<()>,
}

impl DirResponseCache {
    /// Open (creating if needed) the cache root at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseCacheError::Backend`] when the directory cannot be
    /// created or opened.
    pub fn open(path: &Utf8Path) -> Result<Self, ResponseCacheError> {
        Dir::create_ambient_dir_all(path, ambient_authority())
            .map_err(|err| ResponseCacheError::backend(format!("create {path}: {err}")))?;
        let root = Dir::open_ambient_dir(path, ambient_authority())
            .map_err(|err| ResponseCacheError::backend(format!("open {path}: {err}")))?;
        Ok(Self {
            root,
            guard: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_cache(&self, cache: &str) -> Result<Option<Dir>, ResponseCacheError> {
        validate_cache_name(cache)?;
        match self.root.open_dir(cache) {
            Ok(dir) => Ok(Some(dir)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(backend(cache, &err)),
        }
    }
}

#[async_trait]
impl ResponseCacheStore for DirResponseCache {
    async fn lookup(
        &self,
        cache: &str,
        key: &str,
    ) -> Result<Option<HttpResponse>, ResponseCacheError> {
        let _guard = self.lock();
        let Some(dir) = self.open_cache(cache)? else {
            return Ok(None);
        };
        let raw = match dir.read(entry_file(key)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(backend(cache, &err)),
        };
        let entry: StoredEntry = serde_json::from_slice(&raw)
            .map_err(|err| ResponseCacheError::serialization(err.to_string()))?;
        Ok(Some(entry.response))
    }

    async fn put(
        &self,
        cache: &str,
        key: &str,
        response: &HttpResponse,
    ) -> Result<(), ResponseCacheError> {
        let _guard = self.lock();
        validate_cache_name(cache)?;
        self.root
            .create_dir_all(cache)
            .map_err(|err| backend(cache, &err))?;
        let dir = self
            .root
            .open_dir(cache)
            .map_err(|err| backend(cache, &err))?;
        let encoded = serde_json::to_vec(&StoredEntry {
            key: key.to_owned(),
            response: response.clone(),
        })
        .map_err(|err| ResponseCacheError::serialization(err.to_string()))?;
        write_atomic(&dir, &entry_file(key), &encoded).map_err(|err| backend(cache, &err))
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>, ResponseCacheError> {
        let _guard = self.lock();
        let Some(dir) = self.open_cache(cache)? else {
            return Ok(Vec::new());
        };
        let mut keys = Vec::new();
        for entry in dir.entries().map_err(|err| backend(cache, &err))? {
            let entry = entry.map_err(|err| backend(cache, &err))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !name.ends_with(ENTRY_SUFFIX) {
                continue;
            }
            let parsed = dir
                .read(name)
                .map_err(|err| err.to_string())
                .and_then(|raw| {
                    serde_json::from_slice::<StoredEntry>(&raw).map_err(|err| err.to_string())
                });
            match parsed {
                Ok(stored) => keys.push(stored.key),
                Err(error) => warn!(cache, file = name, error = %error, "skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn cache_names(&self) -> Result<Vec<String>, ResponseCacheError> {
        let _guard = self.lock();
        let mut names = Vec::new();
        for entry in self.root.entries().map_err(|err| backend(".", &err))? {
            let entry = entry.map_err(|err| backend(".", &err))?;
            let is_dir = entry.file_type().is_ok_and(|kind| kind.is_dir());
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool, ResponseCacheError> {
        let _guard = self.lock();
        validate_cache_name(cache)?;
        match self.root.remove_dir_all(cache) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(backend(cache, &err)),
        }
    }
}

fn entry_file(key: &str) -> String {
    format!("{}{ENTRY_SUFFIX}", hex::encode(Sha256::digest(key.as_bytes())))
}

fn validate_cache_name(cache: &str) -> Result<(), ResponseCacheError> {
    let valid = !cache.is_empty()
        && !cache.starts_with('.')
        && cache
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid && Path::new(cache).components().count() == 1 {
        Ok(())
    } else {
        Err(ResponseCacheError::backend(format!(
            "`{cache}` is not a valid cache name"
        )))
    }
}

fn backend(cache: &str, err: &io::Error) -> ResponseCacheError {
    ResponseCacheError::backend(format!("cache {cache}: {err}"))
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::rstest;

    use super::*;

    fn cache_root(tmp: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().join("responses")).expect("utf8 temp path")
    }

    #[rstest]
    #[tokio::test]
    async fn entries_survive_reopening() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let key = "https://api.aladhan.com/v1/timings/01-03-2026?latitude=-6.2088";
        let response = HttpResponse::new(200, "{}").with_content_type("application/json");
        DirResponseCache::open(&cache_root(&tmp))
            .expect("open")
            .put("prayer-times-v1-api", key, &response)
            .await
            .expect("put");

        let reopened = DirResponseCache::open(&cache_root(&tmp)).expect("reopen");
        assert_eq!(
            reopened
                .lookup("prayer-times-v1-api", key)
                .await
                .expect("lookup"),
            Some(response)
        );
        assert_eq!(
            reopened.keys("prayer-times-v1-api").await.expect("keys"),
            vec![key.to_owned()]
        );
        assert_eq!(
            reopened.cache_names().await.expect("names"),
            vec!["prayer-times-v1-api".to_owned()]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn deleting_a_cache_removes_its_entries() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let cache = DirResponseCache::open(&cache_root(&tmp)).expect("open");
        cache
            .put("old-v1-static", "https://app.test/a.css", &HttpResponse::new(200, "a"))
            .await
            .expect("put");

        assert!(cache.delete_cache("old-v1-static").await.expect("delete"));
        assert!(!cache.delete_cache("old-v1-static").await.expect("delete again"));
        assert!(cache.keys("old-v1-static").await.expect("keys").is_empty());
        assert!(
            cache
                .lookup("old-v1-static", "https://app.test/a.css")
                .await
                .expect("lookup")
                .is_none()
        );
    }

    #[rstest]
    #[case("")]
    #[case("../escape")]
    #[case(".hidden")]
    #[case("a/b")]
    #[tokio::test]
    async fn rejects_unsafe_cache_names(#[case] name: &str) {
        let tmp = tempfile::tempdir().expect("temp dir");
        let cache = DirResponseCache::open(&cache_root(&tmp)).expect("open");
        let err = cache
            .put(name, "k", &HttpResponse::new(200, "x"))
            .await
            .expect_err("unsafe name");
        assert!(matches!(err, ResponseCacheError::Backend { .. }));
    }
}
