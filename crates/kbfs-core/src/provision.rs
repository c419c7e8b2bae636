//! Construction contracts for the tiers and the networked identity provider.
//!
//! Bootstrap code never names a concrete tier type; it asks a [`TierBuilder`]
//! for an ephemeral, persistent or remote instance and an [`IdentityService`]
//! for the networked identity clients. Tests substitute both.

use crate::codec::Codec;
use crate::errors::ServerResult;
use crate::identity::{CryptoOps, IdentityVerifier};
use crate::servers::{BlockServer, KeyServer, MetadataServer, RemoteServer};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle-index directory under a storage root
pub const HANDLES_DIR: &str = "kbfs_handles";
/// Metadata head directory under a storage root
pub const MD_DIR: &str = "kbfs_md";
/// Revision history directory under a storage root
pub const REVISIONS_DIR: &str = "kbfs_revisions";
/// Key-half directory under a storage root
pub const KEY_DIR: &str = "kbfs_key";
/// Block directory under a storage root
pub const BLOCK_DIR: &str = "kbfs_block";

/// The three independently addressable stores of a persistent metadata server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLayout {
    /// Handle index
    pub handles: PathBuf,
    /// Latest revision per folder
    pub md: PathBuf,
    /// Revision history
    pub revisions: PathBuf,
}

impl MetadataLayout {
    /// Standard layout under `root`
    pub fn under(root: &Path) -> Self {
        Self {
            handles: root.join(HANDLES_DIR),
            md: root.join(MD_DIR),
            revisions: root.join(REVISIONS_DIR),
        }
    }
}

/// Key server directory under `root`
pub fn key_path(root: &Path) -> PathBuf {
    root.join(KEY_DIR)
}

/// Block server directory under `root`
pub fn block_path(root: &Path) -> PathBuf {
    root.join(BLOCK_DIR)
}

/// Constructors for every tier variant.
///
/// Local constructors may fail and may block on disk I/O. The remote
/// constructor cannot fail: connectivity is the returned client's concern.
pub trait TierBuilder: Send + Sync {
    /// In-memory metadata server
    fn metadata_memory(&self) -> ServerResult<Arc<dyn MetadataServer>>;

    /// Persistent metadata server over `layout`
    fn metadata_persistent(&self, layout: &MetadataLayout)
        -> ServerResult<Arc<dyn MetadataServer>>;

    /// Client of the remote metadata peer at `addr`
    fn metadata_remote(&self, addr: &str) -> Arc<dyn RemoteServer>;

    /// In-memory key server
    fn key_memory(&self) -> ServerResult<Arc<dyn KeyServer>>;

    /// Persistent key server under `path`
    fn key_persistent(&self, path: &Path) -> ServerResult<Arc<dyn KeyServer>>;

    /// In-memory block server
    fn block_memory(&self) -> ServerResult<Arc<dyn BlockServer>>;

    /// Persistent block server under `path`
    fn block_persistent(&self, path: &Path) -> ServerResult<Arc<dyn BlockServer>>;
}

/// Networked identity provider backed by real device keys
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolve socket/session settings for the identity daemon
    async fn configure_session(&self) -> ServerResult<()>;

    /// Identity verification client bound to the session
    async fn kbpki(&self) -> ServerResult<Arc<dyn IdentityVerifier>>;

    /// Crypto client bound to the session
    async fn crypto(&self, codec: Codec) -> ServerResult<Arc<dyn CryptoOps>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_names_are_stable() {
        let layout = MetadataLayout::under(Path::new("/tmp/x"));
        assert_eq!(layout.handles, PathBuf::from("/tmp/x/kbfs_handles"));
        assert_eq!(layout.md, PathBuf::from("/tmp/x/kbfs_md"));
        assert_eq!(layout.revisions, PathBuf::from("/tmp/x/kbfs_revisions"));
        assert_eq!(key_path(Path::new("/tmp/x")), PathBuf::from("/tmp/x/kbfs_key"));
        assert_eq!(block_path(Path::new("/tmp/x")), PathBuf::from("/tmp/x/kbfs_block"));
    }
}
