//! HTTP response cache adapters.

mod dir;
mod memory;

pub use dir::DirResponseCache;
pub use memory::MemoryResponseCache;
