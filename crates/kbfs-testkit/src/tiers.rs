//! Call-counting tier builder and in-memory stand-ins for every tier variant.
//!
//! Persistent tiers are simulated: they hold their data in memory but report
//! the directories they were asked for, so tests can assert on layout without
//! creating anything on disk.

use async_trait::async_trait;
use kbfs_core::{
    BlockId, BlockServer, Codec, KeyHalfId, KeyServer, MdRecord, MetadataLayout, MetadataServer,
    RemoteServer, ServerError, ServerResult, Tier, TierBuilder, TierStorage, TlfId,
};
use kbfs_servers::{BlockServerLocal, KeyServerLocal, MdServerLocal};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One constructor of a [`TierBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TierKind {
    MetadataMemory,
    MetadataPersistent,
    MetadataRemote,
    KeyMemory,
    KeyPersistent,
    BlockMemory,
    BlockPersistent,
}

impl TierKind {
    /// Every constructor
    pub const ALL: [TierKind; 7] = [
        TierKind::MetadataMemory,
        TierKind::MetadataPersistent,
        TierKind::MetadataRemote,
        TierKind::KeyMemory,
        TierKind::KeyPersistent,
        TierKind::BlockMemory,
        TierKind::BlockPersistent,
    ];
}

/// A [`TierBuilder`] that counts calls and fails on request
#[derive(Default)]
pub struct CountingTiers {
    calls: Mutex<HashMap<TierKind, usize>>,
    failing: HashSet<TierKind>,
    paths: Mutex<Vec<PathBuf>>,
    remotes: Mutex<Vec<Arc<FakeRemoteServer>>>,
}

impl CountingTiers {
    /// Builder where every constructor succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `kind` constructor return an initialization error.
    ///
    /// The remote constructor cannot fail, so failing it has no effect.
    pub fn fail_on(mut self, kind: TierKind) -> Self {
        self.failing.insert(kind);
        self
    }

    /// Times the `kind` constructor was called
    pub fn calls(&self, kind: TierKind) -> usize {
        self.calls.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Calls across all constructors
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Directories requested by persistent constructors, in call order
    pub fn persistent_paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }

    /// Remote peers handed out so far
    pub fn remotes(&self) -> Vec<Arc<FakeRemoteServer>> {
        self.remotes.lock().clone()
    }

    fn record(&self, kind: TierKind, location: &str) -> ServerResult<()> {
        *self.calls.lock().entry(kind).or_insert(0) += 1;
        if self.failing.contains(&kind) {
            return Err(ServerError::init(location, format!("injected {kind:?} failure")));
        }
        Ok(())
    }
}

impl TierBuilder for CountingTiers {
    fn metadata_memory(&self) -> ServerResult<Arc<dyn MetadataServer>> {
        self.record(TierKind::MetadataMemory, "memory")?;
        Ok(Arc::new(SimulatedMetadata::new(TierStorage::Ephemeral)))
    }

    fn metadata_persistent(
        &self,
        layout: &MetadataLayout,
    ) -> ServerResult<Arc<dyn MetadataServer>> {
        self.record(TierKind::MetadataPersistent, &layout.md.display().to_string())?;
        let dirs = vec![layout.handles.clone(), layout.md.clone(), layout.revisions.clone()];
        self.paths.lock().extend(dirs.iter().cloned());
        Ok(Arc::new(SimulatedMetadata::new(TierStorage::Persistent(dirs))))
    }

    fn metadata_remote(&self, addr: &str) -> Arc<dyn RemoteServer> {
        *self.calls.lock().entry(TierKind::MetadataRemote).or_insert(0) += 1;
        let server = Arc::new(FakeRemoteServer::new(addr));
        self.remotes.lock().push(server.clone());
        server
    }

    fn key_memory(&self) -> ServerResult<Arc<dyn KeyServer>> {
        self.record(TierKind::KeyMemory, "memory")?;
        Ok(Arc::new(SimulatedKeys::new(TierStorage::Ephemeral)))
    }

    fn key_persistent(&self, path: &Path) -> ServerResult<Arc<dyn KeyServer>> {
        self.record(TierKind::KeyPersistent, &path.display().to_string())?;
        self.paths.lock().push(path.to_path_buf());
        Ok(Arc::new(SimulatedKeys::new(TierStorage::Persistent(vec![
            path.to_path_buf()
        ]))))
    }

    fn block_memory(&self) -> ServerResult<Arc<dyn BlockServer>> {
        self.record(TierKind::BlockMemory, "memory")?;
        Ok(Arc::new(SimulatedBlocks::new(TierStorage::Ephemeral)))
    }

    fn block_persistent(&self, path: &Path) -> ServerResult<Arc<dyn BlockServer>> {
        self.record(TierKind::BlockPersistent, &path.display().to_string())?;
        self.paths.lock().push(path.to_path_buf());
        Ok(Arc::new(SimulatedBlocks::new(TierStorage::Persistent(vec![
            path.to_path_buf()
        ]))))
    }
}

struct SimulatedMetadata {
    inner: MdServerLocal,
    storage: TierStorage,
}

impl SimulatedMetadata {
    fn new(storage: TierStorage) -> Self {
        Self {
            inner: MdServerLocal::memory(Codec::default()),
            storage,
        }
    }
}

impl Tier for SimulatedMetadata {
    fn storage(&self) -> TierStorage {
        self.storage.clone()
    }
}

#[async_trait]
impl MetadataServer for SimulatedMetadata {
    async fn get_tlf_id(&self, handle: &str) -> ServerResult<Option<TlfId>> {
        self.inner.get_tlf_id(handle).await
    }

    async fn register_handle(&self, handle: &str) -> ServerResult<TlfId> {
        self.inner.register_handle(handle).await
    }

    async fn put(&self, record: MdRecord) -> ServerResult<()> {
        self.inner.put(record).await
    }

    async fn get_latest(&self, tlf: TlfId) -> ServerResult<Option<MdRecord>> {
        self.inner.get_latest(tlf).await
    }

    async fn get_range(&self, tlf: TlfId, start: u64, stop: u64) -> ServerResult<Vec<MdRecord>> {
        self.inner.get_range(tlf, start, stop).await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

struct SimulatedKeys {
    inner: KeyServerLocal,
    storage: TierStorage,
}

impl SimulatedKeys {
    fn new(storage: TierStorage) -> Self {
        Self {
            inner: KeyServerLocal::memory(),
            storage,
        }
    }
}

impl Tier for SimulatedKeys {
    fn storage(&self) -> TierStorage {
        self.storage.clone()
    }
}

#[async_trait]
impl KeyServer for SimulatedKeys {
    async fn put_key_half(&self, id: KeyHalfId, half: Vec<u8>) -> ServerResult<()> {
        self.inner.put_key_half(id, half).await
    }

    async fn get_key_half(&self, id: KeyHalfId) -> ServerResult<Option<Vec<u8>>> {
        self.inner.get_key_half(id).await
    }
}

struct SimulatedBlocks {
    inner: BlockServerLocal,
    storage: TierStorage,
}

impl SimulatedBlocks {
    fn new(storage: TierStorage) -> Self {
        Self {
            inner: BlockServerLocal::memory(),
            storage,
        }
    }
}

impl Tier for SimulatedBlocks {
    fn storage(&self) -> TierStorage {
        self.storage.clone()
    }
}

#[async_trait]
impl BlockServer for SimulatedBlocks {
    async fn put(&self, id: BlockId, contents: Vec<u8>) -> ServerResult<()> {
        BlockServer::put(&self.inner, id, contents).await
    }

    async fn get(&self, id: BlockId) -> ServerResult<Option<Vec<u8>>> {
        self.inner.get(id).await
    }

    async fn remove(&self, id: BlockId) -> ServerResult<bool> {
        self.inner.remove(id).await
    }

    async fn shutdown(&self) {
        BlockServer::shutdown(&self.inner).await;
    }
}

/// In-memory peer serving both the metadata and key roles
pub struct FakeRemoteServer {
    addr: String,
    metadata: MdServerLocal,
    keys: KeyServerLocal,
}

impl FakeRemoteServer {
    /// Empty peer reporting `addr`
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            metadata: MdServerLocal::memory(Codec::default()),
            keys: KeyServerLocal::memory(),
        }
    }
}

impl Tier for FakeRemoteServer {
    fn storage(&self) -> TierStorage {
        TierStorage::Remote(self.addr.clone())
    }
}

#[async_trait]
impl MetadataServer for FakeRemoteServer {
    async fn get_tlf_id(&self, handle: &str) -> ServerResult<Option<TlfId>> {
        self.metadata.get_tlf_id(handle).await
    }

    async fn register_handle(&self, handle: &str) -> ServerResult<TlfId> {
        self.metadata.register_handle(handle).await
    }

    async fn put(&self, record: MdRecord) -> ServerResult<()> {
        self.metadata.put(record).await
    }

    async fn get_latest(&self, tlf: TlfId) -> ServerResult<Option<MdRecord>> {
        self.metadata.get_latest(tlf).await
    }

    async fn get_range(&self, tlf: TlfId, start: u64, stop: u64) -> ServerResult<Vec<MdRecord>> {
        self.metadata.get_range(tlf, start, stop).await
    }

    async fn shutdown(&self) {
        self.metadata.shutdown().await;
    }
}

#[async_trait]
impl KeyServer for FakeRemoteServer {
    async fn put_key_half(&self, id: KeyHalfId, half: Vec<u8>) -> ServerResult<()> {
        self.keys.put_key_half(id, half).await
    }

    async fn get_key_half(&self, id: KeyHalfId) -> ServerResult<Option<Vec<u8>>> {
        self.keys.get_key_half(id).await
    }
}

impl RemoteServer for FakeRemoteServer {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn as_metadata_server(self: Arc<Self>) -> Arc<dyn MetadataServer> {
        self
    }

    fn as_key_server(self: Arc<Self>) -> Arc<dyn KeyServer> {
        self
    }
}
