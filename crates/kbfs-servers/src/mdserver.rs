//! Local metadata server, in-memory or disk-backed.
//!
//! State lives in three independent stores: the handle index (handle →
//! folder id), the head store (folder id → latest revision) and the revision
//! history (folder id + revision → record).

use crate::store::{DiskStore, KvStore, MemoryStore};
use async_trait::async_trait;
use kbfs_core::{
    Codec, MdRecord, MetadataServer, ServerError, ServerResult, Tier, TierStorage, TlfId,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Metadata server running inside this process
pub struct MdServerLocal {
    codec: Codec,
    handles: Arc<dyn KvStore>,
    heads: Arc<dyn KvStore>,
    revisions: Arc<dyn KvStore>,
    // Serializes head check + write so revisions stay contiguous.
    write_lock: Mutex<()>,
}

impl MdServerLocal {
    /// Create an in-memory metadata server
    pub fn memory(codec: Codec) -> Self {
        Self::with_stores(
            codec,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Open a persistent metadata server over three directories
    pub fn persistent(
        codec: Codec,
        handle_path: &Path,
        md_path: &Path,
        revision_path: &Path,
    ) -> ServerResult<Self> {
        let handles = DiskStore::open(handle_path)?;
        let heads = DiskStore::open(md_path)?;
        let revisions = DiskStore::open(revision_path)?;
        debug!(
            handles = %handle_path.display(),
            md = %md_path.display(),
            revisions = %revision_path.display(),
            "opened persistent metadata stores"
        );
        Ok(Self::with_stores(
            codec,
            Arc::new(handles),
            Arc::new(heads),
            Arc::new(revisions),
        ))
    }

    fn with_stores(
        codec: Codec,
        handles: Arc<dyn KvStore>,
        heads: Arc<dyn KvStore>,
        revisions: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            codec,
            handles,
            heads,
            revisions,
            write_lock: Mutex::new(()),
        }
    }

    fn revision_key(tlf: TlfId, revision: u64) -> String {
        format!("{tlf}-{revision:020}")
    }

    fn decode_record(&self, bytes: &[u8]) -> ServerResult<MdRecord> {
        self.codec.decode(bytes).map_err(ServerError::Codec)
    }
}

impl Tier for MdServerLocal {
    fn storage(&self) -> TierStorage {
        let dirs: Vec<_> = [&self.handles, &self.heads, &self.revisions]
            .iter()
            .filter_map(|store| store.location())
            .collect();
        if dirs.is_empty() {
            TierStorage::Ephemeral
        } else {
            TierStorage::Persistent(dirs)
        }
    }
}

#[async_trait]
impl MetadataServer for MdServerLocal {
    async fn get_tlf_id(&self, handle: &str) -> ServerResult<Option<TlfId>> {
        match self.handles.get(handle).await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes).map_err(ServerError::Codec)?)),
            None => Ok(None),
        }
    }

    async fn register_handle(&self, handle: &str) -> ServerResult<TlfId> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.get_tlf_id(handle).await? {
            return Ok(existing);
        }
        let id = TlfId::from_handle(handle);
        let encoded = self.codec.encode(&id).map_err(ServerError::Codec)?;
        self.handles.put(handle, encoded).await?;
        Ok(id)
    }

    async fn put(&self, record: MdRecord) -> ServerResult<()> {
        let _guard = self.write_lock.lock().await;
        let expected = match self.heads.get(&record.tlf.to_string()).await? {
            Some(bytes) => self.decode_record(&bytes)?.revision + 1,
            None => 1,
        };
        if record.revision != expected {
            return Err(ServerError::RevisionConflict {
                expected,
                actual: record.revision,
            });
        }

        let encoded = self.codec.encode(&record).map_err(ServerError::Codec)?;
        self.revisions
            .put(&Self::revision_key(record.tlf, record.revision), encoded.clone())
            .await?;
        self.heads.put(&record.tlf.to_string(), encoded).await
    }

    async fn get_latest(&self, tlf: TlfId) -> ServerResult<Option<MdRecord>> {
        match self.heads.get(&tlf.to_string()).await? {
            Some(bytes) => Ok(Some(self.decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_range(&self, tlf: TlfId, start: u64, stop: u64) -> ServerResult<Vec<MdRecord>> {
        let mut records = Vec::new();
        for revision in start.max(1)..=stop {
            match self.revisions.get(&Self::revision_key(tlf, revision)).await? {
                Some(bytes) => records.push(self.decode_record(&bytes)?),
                None => break,
            }
        }
        Ok(records)
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use kbfs_core::Uid;

    fn record(tlf: TlfId, revision: u64) -> MdRecord {
        MdRecord {
            tlf,
            revision,
            writer: Uid::from_test_index(1),
            data: vec![revision as u8],
        }
    }

    #[tokio::test]
    async fn test_revisions_must_be_contiguous() {
        let server = MdServerLocal::memory(Codec::new());
        let tlf = server.register_handle("strib").await.unwrap();

        server.put(record(tlf, 1)).await.unwrap();
        let err = server.put(record(tlf, 3)).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::RevisionConflict {
                expected: 2,
                actual: 3
            }
        ));
        server.put(record(tlf, 2)).await.unwrap();

        assert_eq!(server.get_latest(tlf).await.unwrap().unwrap().revision, 2);
        assert_eq!(server.get_range(tlf, 1, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_register_handle_is_stable() {
        let server = MdServerLocal::memory(Codec::new());
        let first = server.register_handle("strib,max").await.unwrap();
        let second = server.register_handle("strib,max").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            server.get_tlf_id("strib,max").await.unwrap(),
            Some(first)
        );
        assert!(server.storage().is_ephemeral());
    }

    #[tokio::test]
    async fn test_persistent_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let paths = [
            dir.path().join("kbfs_handles"),
            dir.path().join("kbfs_md"),
            dir.path().join("kbfs_revisions"),
        ];

        let server =
            MdServerLocal::persistent(Codec::new(), &paths[0], &paths[1], &paths[2]).unwrap();
        let tlf = server.register_handle("chris").await.unwrap();
        server.put(record(tlf, 1)).await.unwrap();
        drop(server);

        let server =
            MdServerLocal::persistent(Codec::new(), &paths[0], &paths[1], &paths[2]).unwrap();
        assert_eq!(server.get_tlf_id("chris").await.unwrap(), Some(tlf));
        assert_eq!(server.get_latest(tlf).await.unwrap(), Some(record(tlf, 1)));
        assert_eq!(
            server.storage(),
            TierStorage::Persistent(paths.to_vec())
        );
    }
}
