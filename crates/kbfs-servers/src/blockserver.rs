//! Local block server, in-memory or disk-backed

use crate::store::{DiskStore, KvStore, MemoryStore};
use async_trait::async_trait;
use kbfs_core::{BlockId, BlockServer, ServerError, ServerResult, Tier, TierStorage};
use std::path::Path;
use std::sync::Arc;

/// Block server running inside this process
pub struct BlockServerLocal {
    blocks: Arc<dyn KvStore>,
}

impl BlockServerLocal {
    /// Create an in-memory block server
    pub fn memory() -> Self {
        Self {
            blocks: Arc::new(MemoryStore::new()),
        }
    }

    /// Open a persistent block server
    pub fn persistent(block_path: &Path) -> ServerResult<Self> {
        Ok(Self {
            blocks: Arc::new(DiskStore::open(block_path)?),
        })
    }
}

impl Tier for BlockServerLocal {
    fn storage(&self) -> TierStorage {
        match self.blocks.location() {
            Some(path) => TierStorage::Persistent(vec![path]),
            None => TierStorage::Ephemeral,
        }
    }
}

#[async_trait]
impl BlockServer for BlockServerLocal {
    async fn put(&self, id: BlockId, contents: Vec<u8>) -> ServerResult<()> {
        if BlockId::for_contents(&contents) != id {
            return Err(ServerError::WriteFailed(format!(
                "block {id} does not match its contents"
            )));
        }
        self.blocks.put(&id.to_string(), contents).await
    }

    async fn get(&self, id: BlockId) -> ServerResult<Option<Vec<u8>>> {
        self.blocks.get(&id.to_string()).await
    }

    async fn remove(&self, id: BlockId) -> ServerResult<bool> {
        self.blocks.remove(&id.to_string()).await
    }

    async fn shutdown(&self) {}
}
