//! Configuration assembly.
//!
//! [`ConfigAssembler::assemble`] runs a fixed sequence: mode, metadata server,
//! key server, block server, identity. The first failure aborts the rest and
//! nothing partially built is returned.

use crate::error::{InitError, InitResult};
use crate::factory::TierFactory;
use crate::identity::{DaemonIdentityService, IdentityProvisioner, LocalUser};
use crate::selector::{key_server_mode, BackendMode, BackendSelector};
use kbfs_core::{
    BlockServer, Codec, CryptoOps, IdentityService, IdentityVerifier, KeyServer, MetadataServer,
    StorageRoot, TierBuilder,
};
use kbfs_servers::{ReliabilityConfig, StandardTiers};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A fully wired client configuration
pub struct Configuration {
    codec: Codec,
    mode: BackendMode,
    storage_root: StorageRoot,
    md_server: Arc<dyn MetadataServer>,
    key_server: Arc<dyn KeyServer>,
    block_server: Arc<dyn BlockServer>,
    kbpki: Arc<dyn IdentityVerifier>,
    crypto: Arc<dyn CryptoOps>,
    local_user: Option<LocalUser>,
}

impl Configuration {
    /// Shared codec
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Metadata backend mode the configuration was built for
    pub fn mode(&self) -> &BackendMode {
        &self.mode
    }

    /// Storage root the local tiers were built under
    pub fn storage_root(&self) -> &StorageRoot {
        &self.storage_root
    }

    /// Metadata server
    pub fn md_server(&self) -> &Arc<dyn MetadataServer> {
        &self.md_server
    }

    /// Key server
    pub fn key_server(&self) -> &Arc<dyn KeyServer> {
        &self.key_server
    }

    /// Block server
    pub fn block_server(&self) -> &Arc<dyn BlockServer> {
        &self.block_server
    }

    /// Identity verification
    pub fn kbpki(&self) -> &Arc<dyn IdentityVerifier> {
        &self.kbpki
    }

    /// Crypto operations
    pub fn crypto(&self) -> &Arc<dyn CryptoOps> {
        &self.crypto
    }

    /// The fixture identity, when running offline
    pub fn local_user(&self) -> Option<&LocalUser> {
        self.local_user.as_ref()
    }

    /// Whether the key server is the metadata server object itself
    pub fn key_server_shares_metadata(&self) -> bool {
        let md = Arc::as_ptr(&self.md_server) as *const ();
        let key = Arc::as_ptr(&self.key_server) as *const ();
        std::ptr::eq(md, key)
    }

    /// Shut down the metadata and block servers
    pub async fn shutdown_tiers(&self) {
        self.md_server.shutdown().await;
        self.block_server.shutdown().await;
        debug!("tiers shut down");
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("mode", &self.mode)
            .field("storage_root", &self.storage_root)
            .field("md_server", &self.md_server.storage())
            .field("key_server", &self.key_server.storage())
            .field("block_server", &self.block_server.storage())
            .field("local_user", &self.local_user)
            .finish_non_exhaustive()
    }
}

/// Wires tiers and identity into a [`Configuration`]
#[derive(Debug, Clone)]
pub struct ConfigAssembler {
    codec: Codec,
    selector: BackendSelector,
    factory: TierFactory,
    identity: IdentityProvisioner,
}

impl ConfigAssembler {
    /// Assembler over the standard tiers and the identity daemon, with the
    /// backend mode read from the environment
    pub fn new() -> Self {
        Self::with_reliability(ReliabilityConfig::default())
    }

    /// Like [`ConfigAssembler::new`] with custom reconnect timing
    pub fn with_reliability(reliability: ReliabilityConfig) -> Self {
        let codec = Codec::default();
        Self {
            codec,
            selector: BackendSelector::from_env(),
            factory: TierFactory::new(Arc::new(StandardTiers::new(codec, reliability))),
            identity: IdentityProvisioner::new(Arc::new(DaemonIdentityService::new(reliability))),
        }
    }

    /// Replace the backend selector
    pub fn with_selector(mut self, selector: BackendSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Replace the tier builder
    pub fn with_tier_builder(mut self, builder: Arc<dyn TierBuilder>) -> Self {
        self.factory = TierFactory::new(builder);
        self
    }

    /// Replace the networked identity service
    pub fn with_identity_service(mut self, service: Arc<dyn IdentityService>) -> Self {
        self.identity = IdentityProvisioner::new(service);
        self
    }

    /// Build every tier and the identity handles, in order
    pub async fn assemble(&self, local_user: &str, root: &StorageRoot) -> InitResult<Configuration> {
        let mode = self.selector.decide_mode();
        info!(?mode, ?root, "assembling configuration");

        let metadata = self
            .factory
            .build_metadata_server(&mode, root)
            .map_err(|e| stage_failed(InitError::MetadataServer(e)))?;

        let key_server = self
            .factory
            .build_key_server(&key_server_mode(&mode), root, &metadata)
            .map_err(|e| stage_failed(InitError::KeyServer(e)))?;

        let block_server = self
            .factory
            .build_block_server(root)
            .map_err(|e| stage_failed(InitError::BlockServer(e)))?;

        let identity = self
            .identity
            .build_identity(local_user, self.codec)
            .await
            .map_err(stage_failed)?;

        let config = Configuration {
            codec: self.codec,
            mode,
            storage_root: root.clone(),
            md_server: metadata.metadata_server(),
            key_server,
            block_server,
            kbpki: identity.kbpki,
            crypto: identity.crypto,
            local_user: identity.local_user,
        };
        info!(?config, "configuration assembled");
        Ok(config)
    }
}

impl Default for ConfigAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn stage_failed(err: InitError) -> InitError {
    warn!(stage = err.stage(), error = %err, "configuration assembly aborted");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbfs_core::TierStorage;
    use kbfs_testkit::{CountingTiers, MockIdentityService, TierKind};

    fn assembler(
        addr: Option<&str>,
        tiers: Arc<CountingTiers>,
        identity: Arc<MockIdentityService>,
    ) -> ConfigAssembler {
        ConfigAssembler::new()
            .with_selector(BackendSelector::fixed(addr))
            .with_tier_builder(tiers)
            .with_identity_service(identity)
    }

    #[tokio::test]
    async fn test_local_ephemeral_assembly() {
        let tiers = Arc::new(CountingTiers::new());
        let identity = Arc::new(MockIdentityService::new());
        let config = assembler(None, tiers.clone(), identity.clone())
            .assemble("", &StorageRoot::Ephemeral)
            .await
            .unwrap();

        assert!(config.mode().is_local());
        assert!(config.md_server().storage().is_ephemeral());
        assert!(config.key_server().storage().is_ephemeral());
        assert!(config.block_server().storage().is_ephemeral());
        assert!(!config.key_server_shares_metadata());
        assert!(config.local_user().is_none());
        assert_eq!(identity.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_remote_assembly_shares_one_peer() {
        let tiers = Arc::new(CountingTiers::new());
        let config = assembler(
            Some("mdserver:443"),
            tiers.clone(),
            Arc::new(MockIdentityService::new()),
        )
        .assemble("fred", &StorageRoot::Ephemeral)
        .await
        .unwrap();

        assert!(config.key_server_shares_metadata());
        assert_eq!(
            config.key_server().storage(),
            TierStorage::Remote("mdserver:443".into())
        );
        assert_eq!(tiers.calls(TierKind::MetadataRemote), 1);
        assert_eq!(tiers.calls(TierKind::KeyMemory), 0);
        assert!(config.block_server().storage().is_ephemeral());
    }

    #[tokio::test]
    async fn test_key_failure_stops_before_block_and_identity() {
        let tiers = Arc::new(CountingTiers::new().fail_on(TierKind::KeyMemory));
        let identity = Arc::new(MockIdentityService::new());
        let err = assembler(None, tiers.clone(), identity.clone())
            .assemble("", &StorageRoot::Ephemeral)
            .await
            .unwrap_err();

        assert!(matches!(err, InitError::KeyServer(_)));
        assert_eq!(err.stage(), "key server");
        assert_eq!(tiers.calls(TierKind::MetadataMemory), 1);
        assert_eq!(tiers.calls(TierKind::BlockMemory), 0);
        assert_eq!(identity.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_block_failure_is_tagged() {
        let tiers = Arc::new(CountingTiers::new().fail_on(TierKind::BlockPersistent));
        let err = assembler(None, tiers, Arc::new(MockIdentityService::new()))
            .assemble("strib", &StorageRoot::WorkingDir)
            .await
            .unwrap_err();

        assert!(matches!(err, InitError::BlockServer(_)));
        assert!(err.to_string().starts_with("cannot open block database"));
    }
}
