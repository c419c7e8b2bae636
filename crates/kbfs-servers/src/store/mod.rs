//! Key/value stores backing the local tiers.
//!
//! Each logical store of a tier (handle index, metadata heads, revision
//! history, key halves, blocks) is one [`KvStore`], so the stores can be
//! addressed and relocated independently.

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use kbfs_core::ServerResult;
use std::path::PathBuf;

/// Byte-oriented key/value store
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store a value, replacing any previous one
    async fn put(&self, key: &str, value: Vec<u8>) -> ServerResult<()>;

    /// Fetch a value
    async fn get(&self, key: &str) -> ServerResult<Option<Vec<u8>>>;

    /// Remove a value, returning whether it existed
    async fn remove(&self, key: &str) -> ServerResult<bool>;

    /// Keys starting with `prefix`, sorted
    async fn keys_with_prefix(&self, prefix: &str) -> ServerResult<Vec<String>>;

    /// Directory this store persists to, if any
    fn location(&self) -> Option<PathBuf>;
}
