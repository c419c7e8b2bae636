//! Default [`TierBuilder`] over the reference tiers

use crate::config::ReliabilityConfig;
use crate::{BlockServerLocal, KeyServerLocal, MdServerLocal, MdServerRemote};
use kbfs_core::{
    BlockServer, Codec, KeyServer, MetadataLayout, MetadataServer, RemoteServer, ServerResult,
    TierBuilder,
};
use std::path::Path;
use std::sync::Arc;

/// Builds the in-memory, on-disk and remote tiers from this crate
#[derive(Debug, Clone, Default)]
pub struct StandardTiers {
    codec: Codec,
    reliability: ReliabilityConfig,
}

impl StandardTiers {
    /// Create a builder
    pub fn new(codec: Codec, reliability: ReliabilityConfig) -> Self {
        Self { codec, reliability }
    }
}

impl TierBuilder for StandardTiers {
    fn metadata_memory(&self) -> ServerResult<Arc<dyn MetadataServer>> {
        Ok(Arc::new(MdServerLocal::memory(self.codec)))
    }

    fn metadata_persistent(
        &self,
        layout: &MetadataLayout,
    ) -> ServerResult<Arc<dyn MetadataServer>> {
        let server =
            MdServerLocal::persistent(self.codec, &layout.handles, &layout.md, &layout.revisions)?;
        Ok(Arc::new(server))
    }

    fn metadata_remote(&self, addr: &str) -> Arc<dyn RemoteServer> {
        MdServerRemote::new(self.codec, addr, self.reliability)
    }

    fn key_memory(&self) -> ServerResult<Arc<dyn KeyServer>> {
        Ok(Arc::new(KeyServerLocal::memory()))
    }

    fn key_persistent(&self, path: &Path) -> ServerResult<Arc<dyn KeyServer>> {
        Ok(Arc::new(KeyServerLocal::persistent(path)?))
    }

    fn block_memory(&self) -> ServerResult<Arc<dyn BlockServer>> {
        Ok(Arc::new(BlockServerLocal::memory()))
    }

    fn block_persistent(&self, path: &Path) -> ServerResult<Arc<dyn BlockServer>> {
        Ok(Arc::new(BlockServerLocal::persistent(path)?))
    }
}
