//! Driven port for persistent string key-value storage.

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by storage backends.
    pub enum StorageError {
        /// Storage is disabled or inaccessible.
        Unavailable => "storage unavailable",
        /// The write would exceed the storage quota.
        QuotaExceeded { message: String } => "storage quota exceeded: {message}",
        /// Any other backend failure.
        Backend { message: String } => "storage backend failed: {message}",
    }
}

/// Synchronous string storage (`localStorage` equivalent).
///
/// Keys are global; callers namespace them.
pub trait StorageBackend: Send + Sync {
    /// Probe whether storage can currently be used.
    fn is_available(&self) -> bool;

    /// Read the raw value under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Missing keys are not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// List every stored key.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}
