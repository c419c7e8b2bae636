//! Capability contracts for the three storage tiers.
//!
//! Every tier reports its [`TierStorage`] so callers (and tests) can tell an
//! ephemeral tier from a persistent or remote one without downcasting.
//!
//! A remote metadata peer also serves the key-server role. That object is
//! modeled as one type implementing both [`MetadataServer`] and [`KeyServer`],
//! exposed through [`RemoteServer`] so a single `Arc` can be handed out under
//! either contract.

use crate::errors::ServerResult;
use crate::identifiers::{BlockId, KeyHalfId, TlfId, Uid};
use crate::storage_root::TierStorage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Common behavior of all tiers
pub trait Tier: Send + Sync {
    /// What this tier is backed by
    fn storage(&self) -> TierStorage;
}

/// One metadata revision of a top-level folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdRecord {
    /// Folder the revision belongs to
    pub tlf: TlfId,
    /// Revision number, starting at 1
    pub revision: u64,
    /// Writer of the revision
    pub writer: Uid,
    /// Signed, encoded metadata
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Metadata server capability
#[async_trait]
pub trait MetadataServer: Tier {
    /// Look up the folder id registered for a canonical handle
    async fn get_tlf_id(&self, handle: &str) -> ServerResult<Option<TlfId>>;

    /// Register a handle, returning the existing id if already registered
    async fn register_handle(&self, handle: &str) -> ServerResult<TlfId>;

    /// Append the next revision of a folder.
    ///
    /// Revisions must be written in order; writing anything but
    /// `latest + 1` is a [`crate::ServerError::RevisionConflict`].
    async fn put(&self, record: MdRecord) -> ServerResult<()>;

    /// Latest revision of a folder
    async fn get_latest(&self, tlf: TlfId) -> ServerResult<Option<MdRecord>>;

    /// Revisions in `start..=stop`, in order
    async fn get_range(&self, tlf: TlfId, start: u64, stop: u64) -> ServerResult<Vec<MdRecord>>;

    /// Release resources held by the server
    async fn shutdown(&self);
}

/// Key server capability: stores the server-side halves of folder keys
#[async_trait]
pub trait KeyServer: Tier {
    /// Store a key half
    async fn put_key_half(&self, id: KeyHalfId, half: Vec<u8>) -> ServerResult<()>;

    /// Fetch a key half
    async fn get_key_half(&self, id: KeyHalfId) -> ServerResult<Option<Vec<u8>>>;
}

/// Block server capability: content-addressed block storage
#[async_trait]
pub trait BlockServer: Tier {
    /// Store a block under its id
    async fn put(&self, id: BlockId, contents: Vec<u8>) -> ServerResult<()>;

    /// Fetch a block
    async fn get(&self, id: BlockId) -> ServerResult<Option<Vec<u8>>>;

    /// Remove a block, returning whether it existed
    async fn remove(&self, id: BlockId) -> ServerResult<bool>;

    /// Release resources held by the server
    async fn shutdown(&self);
}

/// A networked peer serving both the metadata and key roles
pub trait RemoteServer: MetadataServer + KeyServer {
    /// Address of the peer
    fn addr(&self) -> &str;

    /// This object under the metadata contract
    fn as_metadata_server(self: Arc<Self>) -> Arc<dyn MetadataServer>;

    /// This object under the key-server contract
    fn as_key_server(self: Arc<Self>) -> Arc<dyn KeyServer>;
}
