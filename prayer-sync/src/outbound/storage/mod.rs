//! Key-value storage adapters.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Bytes charged for one stored pair.
fn pair_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}
