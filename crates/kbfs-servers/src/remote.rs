//! Remote metadata server client.
//!
//! The remote metadata peer also acts as the key server, so one
//! [`MdServerRemote`] implements both contracts and is shared between the two
//! roles.

use crate::config::ReliabilityConfig;
use crate::rpc::RpcClient;
use async_trait::async_trait;
use kbfs_core::{
    Codec, KeyHalfId, KeyServer, MdRecord, MetadataServer, RemoteServer, ServerResult, Tier,
    TierStorage, TlfId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Requests understood by the remote metadata peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MdRequest {
    /// Look up a handle
    GetTlfId {
        /// Canonical handle
        handle: String,
    },
    /// Register a handle
    RegisterHandle {
        /// Canonical handle
        handle: String,
    },
    /// Append a revision
    Put {
        /// Revision to append
        record: MdRecord,
    },
    /// Latest revision of a folder
    GetLatest {
        /// Folder id
        tlf: TlfId,
    },
    /// Revisions in a range
    GetRange {
        /// Folder id
        tlf: TlfId,
        /// First revision
        start: u64,
        /// Last revision
        stop: u64,
    },
    /// Store a key half
    PutKeyHalf {
        /// Key half id
        id: KeyHalfId,
        /// Key half bytes
        #[serde(with = "serde_bytes")]
        half: Vec<u8>,
    },
    /// Fetch a key half
    GetKeyHalf {
        /// Key half id
        id: KeyHalfId,
    },
}

/// Client of a remote metadata peer
pub struct MdServerRemote {
    rpc: Arc<RpcClient>,
}

impl MdServerRemote {
    /// Create the client.
    ///
    /// This cannot fail and performs no I/O: when a Tokio runtime is running a
    /// background task dials the peer and keeps redialing with backoff,
    /// otherwise the first request dials.
    pub fn new(codec: Codec, addr: &str, reliability: ReliabilityConfig) -> Arc<Self> {
        let rpc = Arc::new(RpcClient::new(addr, codec, reliability));
        rpc.spawn_reconnect();
        Arc::new(Self { rpc })
    }

    /// Whether the connection to the peer is currently up
    pub fn is_connected(&self) -> bool {
        self.rpc.is_connected()
    }
}

impl Tier for MdServerRemote {
    fn storage(&self) -> TierStorage {
        TierStorage::Remote(self.rpc.addr().to_string())
    }
}

#[async_trait]
impl MetadataServer for MdServerRemote {
    async fn get_tlf_id(&self, handle: &str) -> ServerResult<Option<TlfId>> {
        self.rpc
            .call(&MdRequest::GetTlfId {
                handle: handle.to_string(),
            })
            .await
    }

    async fn register_handle(&self, handle: &str) -> ServerResult<TlfId> {
        self.rpc
            .call(&MdRequest::RegisterHandle {
                handle: handle.to_string(),
            })
            .await
    }

    async fn put(&self, record: MdRecord) -> ServerResult<()> {
        self.rpc.call(&MdRequest::Put { record }).await
    }

    async fn get_latest(&self, tlf: TlfId) -> ServerResult<Option<MdRecord>> {
        self.rpc.call(&MdRequest::GetLatest { tlf }).await
    }

    async fn get_range(&self, tlf: TlfId, start: u64, stop: u64) -> ServerResult<Vec<MdRecord>> {
        self.rpc
            .call(&MdRequest::GetRange { tlf, start, stop })
            .await
    }

    async fn shutdown(&self) {
        self.rpc.shutdown().await;
    }
}

#[async_trait]
impl KeyServer for MdServerRemote {
    async fn put_key_half(&self, id: KeyHalfId, half: Vec<u8>) -> ServerResult<()> {
        self.rpc.call(&MdRequest::PutKeyHalf { id, half }).await
    }

    async fn get_key_half(&self, id: KeyHalfId) -> ServerResult<Option<Vec<u8>>> {
        self.rpc.call(&MdRequest::GetKeyHalf { id }).await
    }
}

impl RemoteServer for MdServerRemote {
    fn addr(&self) -> &str {
        self.rpc.addr()
    }

    fn as_metadata_server(self: Arc<Self>) -> Arc<dyn MetadataServer> {
        self
    }

    fn as_key_server(self: Arc<Self>) -> Arc<dyn KeyServer> {
        self
    }
}
