//! File-backed storage: one JSON object per directory, replaced atomically.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Mutex, PoisonError};

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use tracing::warn;

use super::pair_size;
use crate::domain::ports::{StorageBackend, StorageError};
use crate::outbound::atomic_io::write_atomic;

const STORE_FILE: &str = "storage.json";

/// Persistent storage surviving process restarts.
#[derive(Debug)]
pub struct FileStorage {
    dir: Dir,
    items: Mutex<BTreeMap<String, String>>,
    quota_bytes: usize,
}

impl FileStorage {
    /// Open (creating if needed) the storage directory at `path`.
    ///
    /// An unreadable or corrupt store file starts the session empty.
    pub fn open(path: &Utf8Path, quota_bytes: usize) -> Result<Self, StorageError> {
        Dir::create_ambient_dir_all(path, ambient_authority())
            .map_err(|err| StorageError::backend(format!("create {path}: {err}")))?;
        let dir = Dir::open_ambient_dir(path, ambient_authority())
            .map_err(|err| StorageError::backend(format!("open {path}: {err}")))?;

        let items = match dir.read_to_string(STORE_FILE) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path, error = %err, "storage file corrupt; starting empty");
                BTreeMap::new()
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StorageError::backend(format!("read {path}: {err}"))),
        };

        Ok(Self {
            dir,
            items: Mutex::new(items),
            quota_bytes,
        })
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec(items)
            .map_err(|err| StorageError::backend(format!("encode store: {err}")))?;
        write_atomic(&self.dir, STORE_FILE, &encoded)
            .map_err(|err| StorageError::backend(format!("write store: {err}")))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for FileStorage {
    fn is_available(&self) -> bool {
        self.dir.dir_metadata().is_ok()
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.lock();
        let used: usize = items
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .map(|(k, v)| pair_size(k, v))
            .sum();
        if used + pair_size(key, value) > self.quota_bytes {
            return Err(StorageError::quota_exceeded(format!(
                "store limited to {} bytes",
                self.quota_bytes
            )));
        }
        let previous = items.insert(key.to_owned(), value.to_owned());
        if let Err(error) = self.persist(&items) {
            match previous {
                Some(previous) => items.insert(key.to_owned(), previous),
                None => items.remove(key),
            };
            return Err(error);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.lock();
        if items.remove(key).is_some() {
            self.persist(&items)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::rstest;

    use super::*;

    fn store_path(tmp: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().join("store")).expect("utf8 temp path")
    }

    #[rstest]
    fn values_survive_reopen() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = store_path(&tmp);
        {
            let storage = FileStorage::open(&path, 1024).expect("open");
            storage.set_item("prayer:location", "{}").expect("write");
        }
        let reopened = FileStorage::open(&path, 1024).expect("reopen");
        assert_eq!(
            reopened.get_item("prayer:location").expect("read"),
            Some("{}".to_owned())
        );
    }

    #[rstest]
    fn corrupt_file_starts_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = store_path(&tmp);
        std::fs::create_dir_all(&path).expect("mkdir");
        std::fs::write(path.join(STORE_FILE), "not json").expect("seed");

        let storage = FileStorage::open(&path, 1024).expect("open");
        assert!(storage.keys().expect("keys").is_empty());
    }

    #[rstest]
    fn quota_rejection_leaves_previous_state() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::open(&store_path(&tmp), 8).expect("open");
        storage.set_item("a", "1234").expect("fits");
        let err = storage.set_item("b", "12345").expect_err("over quota");
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(storage.keys().expect("keys"), vec!["a".to_owned()]);
    }
}
