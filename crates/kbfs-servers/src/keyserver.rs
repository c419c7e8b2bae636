//! Local key server, in-memory or disk-backed

use crate::store::{DiskStore, KvStore, MemoryStore};
use async_trait::async_trait;
use kbfs_core::{KeyHalfId, KeyServer, ServerResult, Tier, TierStorage};
use std::path::Path;
use std::sync::Arc;

/// Key server running inside this process
pub struct KeyServerLocal {
    halves: Arc<dyn KvStore>,
}

impl KeyServerLocal {
    /// Create an in-memory key server
    pub fn memory() -> Self {
        Self {
            halves: Arc::new(MemoryStore::new()),
        }
    }

    /// Open a persistent key server
    pub fn persistent(key_path: &Path) -> ServerResult<Self> {
        Ok(Self {
            halves: Arc::new(DiskStore::open(key_path)?),
        })
    }
}

impl Tier for KeyServerLocal {
    fn storage(&self) -> TierStorage {
        match self.halves.location() {
            Some(path) => TierStorage::Persistent(vec![path]),
            None => TierStorage::Ephemeral,
        }
    }
}

#[async_trait]
impl KeyServer for KeyServerLocal {
    async fn put_key_half(&self, id: KeyHalfId, half: Vec<u8>) -> ServerResult<()> {
        self.halves.put(&id.to_string(), half).await
    }

    async fn get_key_half(&self, id: KeyHalfId) -> ServerResult<Option<Vec<u8>>> {
        self.halves.get(&id.to_string()).await
    }
}
