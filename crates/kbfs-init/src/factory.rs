//! Tier construction.
//!
//! [`TierFactory`] maps a backend mode and a storage root onto one of the
//! ephemeral, persistent or remote constructors of a [`TierBuilder`]. It never
//! names a concrete tier type, so tests can swap in counting builders.

use crate::selector::BackendMode;
use kbfs_core::provision::{block_path, key_path};
use kbfs_core::{
    BlockServer, KeyServer, MetadataLayout, MetadataServer, RemoteServer, ServerError,
    ServerResult, StorageRoot, TierBuilder,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A constructed metadata server.
///
/// The remote variant keeps the [`RemoteServer`] view so the same object can
/// be reused as the key server.
#[derive(Clone)]
pub enum MetadataHandle {
    /// In-process server, ephemeral or persistent
    Local(Arc<dyn MetadataServer>),
    /// Client of a networked peer that also serves keys
    Remote(Arc<dyn RemoteServer>),
}

impl MetadataHandle {
    /// The handle under the metadata contract
    pub fn metadata_server(&self) -> Arc<dyn MetadataServer> {
        match self {
            Self::Local(server) => Arc::clone(server),
            Self::Remote(server) => Arc::clone(server).as_metadata_server(),
        }
    }

    /// Whether this is a remote peer
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Debug for MetadataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(server) => f.debug_tuple("Local").field(&server.storage()).finish(),
            Self::Remote(server) => f.debug_tuple("Remote").field(&server.addr()).finish(),
        }
    }
}

/// Builds the metadata, key and block tiers
#[derive(Clone)]
pub struct TierFactory {
    builder: Arc<dyn TierBuilder>,
}

impl TierFactory {
    /// Create a factory over `builder`
    pub fn new(builder: Arc<dyn TierBuilder>) -> Self {
        Self { builder }
    }

    /// Build the metadata server.
    ///
    /// Remote construction never fails; connectivity is the client's concern.
    pub fn build_metadata_server(
        &self,
        mode: &BackendMode,
        root: &StorageRoot,
    ) -> ServerResult<MetadataHandle> {
        if let BackendMode::Remote { addr } = mode {
            debug!(%addr, "building remote metadata server");
            return Ok(MetadataHandle::Remote(self.builder.metadata_remote(addr)));
        }

        let Some(dir) = root.dir() else {
            debug!("building in-memory metadata server");
            return Ok(MetadataHandle::Local(self.builder.metadata_memory()?));
        };

        let layout = MetadataLayout::under(dir);
        debug!(?layout, "building persistent metadata server");
        Ok(MetadataHandle::Local(self.builder.metadata_persistent(&layout)?))
    }

    /// Build the key server.
    ///
    /// In remote mode the metadata peer is reused; no second connection is
    /// made. Key mode must equal metadata mode, so any mismatch between `mode`
    /// and `metadata` is rejected.
    pub fn build_key_server(
        &self,
        mode: &BackendMode,
        root: &StorageRoot,
        metadata: &MetadataHandle,
    ) -> ServerResult<Arc<dyn KeyServer>> {
        match (mode, metadata) {
            (BackendMode::Remote { .. }, MetadataHandle::Remote(server)) => {
                debug!(addr = server.addr(), "reusing remote metadata server as key server");
                Ok(Arc::clone(server).as_key_server())
            }
            (BackendMode::Remote { addr }, MetadataHandle::Local(_)) => {
                Err(ServerError::Misconfigured(format!(
                    "remote key server at {addr} requires the remote metadata server"
                )))
            }
            (BackendMode::Local, MetadataHandle::Remote(server)) => {
                Err(ServerError::Misconfigured(format!(
                    "local key server cannot pair with remote metadata server at {}",
                    server.addr()
                )))
            }
            (BackendMode::Local, MetadataHandle::Local(_)) => match root.dir() {
                None => {
                    debug!("building in-memory key server");
                    self.builder.key_memory()
                }
                Some(dir) => {
                    let path = key_path(dir);
                    debug!(path = %path.display(), "building persistent key server");
                    self.builder.key_persistent(&path)
                }
            },
        }
    }

    /// Build the block server; governed by `root` alone
    pub fn build_block_server(&self, root: &StorageRoot) -> ServerResult<Arc<dyn BlockServer>> {
        match root.dir() {
            None => {
                debug!("building in-memory block server");
                self.builder.block_memory()
            }
            Some(dir) => {
                let path = block_path(dir);
                debug!(path = %path.display(), "building persistent block server");
                self.builder.block_persistent(&path)
            }
        }
    }
}

impl fmt::Debug for TierFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierFactory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbfs_core::TierStorage;
    use kbfs_testkit::{CountingTiers, TierKind};
    use std::path::PathBuf;

    fn factory() -> (Arc<CountingTiers>, TierFactory) {
        let tiers = Arc::new(CountingTiers::new());
        let factory = TierFactory::new(tiers.clone());
        (tiers, factory)
    }

    #[test]
    fn test_absent_root_builds_only_memory_metadata() {
        let (tiers, factory) = factory();
        let handle = factory
            .build_metadata_server(&BackendMode::Local, &StorageRoot::Ephemeral)
            .unwrap();

        assert!(handle.metadata_server().storage().is_ephemeral());
        assert_eq!(tiers.calls(TierKind::MetadataMemory), 1);
        assert_eq!(tiers.calls(TierKind::MetadataPersistent), 0);
    }

    #[test]
    fn test_explicit_root_builds_three_metadata_stores() {
        let (tiers, factory) = factory();
        let root = StorageRoot::Path(PathBuf::from("/tmp/x"));
        let handle = factory.build_metadata_server(&BackendMode::Local, &root).unwrap();

        assert_eq!(
            handle.metadata_server().storage(),
            TierStorage::Persistent(vec![
                PathBuf::from("/tmp/x/kbfs_handles"),
                PathBuf::from("/tmp/x/kbfs_md"),
                PathBuf::from("/tmp/x/kbfs_revisions"),
            ])
        );
        assert_eq!(tiers.calls(TierKind::MetadataMemory), 0);
    }

    #[test]
    fn test_working_dir_root_is_persistent_with_relative_paths() {
        let (_, factory) = factory();
        let key = factory
            .build_key_server(
                &BackendMode::Local,
                &StorageRoot::WorkingDir,
                &factory
                    .build_metadata_server(&BackendMode::Local, &StorageRoot::WorkingDir)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(key.storage(), TierStorage::Persistent(vec![PathBuf::from("kbfs_key")]));

        let block = factory.build_block_server(&StorageRoot::WorkingDir).unwrap();
        assert_eq!(block.storage(), TierStorage::Persistent(vec![PathBuf::from("kbfs_block")]));
    }

    #[test]
    fn test_remote_key_server_needs_remote_metadata() {
        let (tiers, factory) = factory();
        let local = factory
            .build_metadata_server(&BackendMode::Local, &StorageRoot::Ephemeral)
            .unwrap();
        let remote_mode = BackendMode::Remote {
            addr: "peer:1".into(),
        };

        let err = factory
            .build_key_server(&remote_mode, &StorageRoot::Ephemeral, &local)
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Misconfigured(_)));
        assert_eq!(tiers.calls(TierKind::KeyMemory), 0);
        assert_eq!(tiers.calls(TierKind::MetadataRemote), 0);
    }

    #[test]
    fn test_remote_mode_makes_one_connection() {
        let (tiers, factory) = factory();
        let mode = BackendMode::Remote {
            addr: "peer:1".into(),
        };
        let metadata = factory.build_metadata_server(&mode, &StorageRoot::Ephemeral).unwrap();
        let key = factory
            .build_key_server(&mode, &StorageRoot::Ephemeral, &metadata)
            .unwrap();

        assert!(metadata.is_remote());
        assert_eq!(key.storage(), TierStorage::Remote("peer:1".into()));
        assert_eq!(tiers.calls(TierKind::MetadataRemote), 1);
        assert_eq!(tiers.calls(TierKind::KeyMemory), 0);
        assert_eq!(tiers.calls(TierKind::KeyPersistent), 0);
    }

    #[test]
    fn test_construction_failure_is_passed_through() {
        let tiers = Arc::new(CountingTiers::new().fail_on(TierKind::BlockPersistent));
        let factory = TierFactory::new(tiers.clone());

        let err = factory
            .build_block_server(&StorageRoot::Path(PathBuf::from("/tmp/x")))
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Init { .. }));
    }
}
