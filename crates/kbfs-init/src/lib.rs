//! # KBFS Init - Client Bootstrap
//!
//! Turns process inputs into a wired client [`Configuration`]:
//!
//! - [`BackendSelector`] decides local or remote metadata from the
//!   environment; the key server always follows the metadata server
//! - [`TierFactory`] builds ephemeral, persistent or remote tiers under a
//!   [`StorageRoot`]
//! - [`IdentityProvisioner`] builds the identity daemon clients, or one of
//!   the four offline fixture users
//! - [`ConfigAssembler`] runs those steps in order and stops at the first
//!   failure
//! - [`LifecycleManager`] owns CPU profiling, the heap snapshot and the
//!   interrupt-triggered exit
//!
//! [`init`] ties them together for a process entry point.

pub mod assembler;
pub mod error;
pub mod factory;
pub mod identity;
pub mod lifecycle;
pub mod sampler;
pub mod selector;

pub use assembler::{ConfigAssembler, Configuration};
pub use error::{InitError, InitResult, LifecycleError};
pub use factory::{MetadataHandle, TierFactory};
pub use identity::{
    CryptoLocal, DaemonIdentityService, IdentityProvisioner, KbpkiLocal, LocalUser,
    ProvisionedIdentity, LOCAL_USERS,
};
pub use kbfs_core::StorageRoot;
pub use lifecycle::{InterruptCallback, LifecycleManager, LifecyclePhase};
pub use sampler::ProcessSampler;
pub use selector::{key_server_mode, BackendMode, BackendSelector, ENV_MDSERVER_ADDR};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Process inputs for [`init`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitOptions {
    /// Fixture user to run as; empty selects the identity daemon
    #[serde(default)]
    pub local_user: String,

    /// Where local tiers persist
    #[serde(default)]
    pub storage_root: StorageRoot,

    /// CPU profile target
    #[serde(default)]
    pub cpu_profile_path: Option<PathBuf>,

    /// Heap snapshot target, written on shutdown
    #[serde(default)]
    pub mem_profile_path: Option<PathBuf>,
}

/// Start profiling, install the interrupt listener and assemble a
/// configuration with the default collaborators.
///
/// The caller owns graceful shutdown: call
/// [`LifecycleManager::shutdown`] with `options.mem_profile_path` on exit.
/// If assembly fails the interrupt listener is removed again; CPU profiling
/// keeps running until shutdown.
pub async fn init(
    options: &InitOptions,
    on_interrupt: Option<InterruptCallback>,
) -> InitResult<(Configuration, Arc<LifecycleManager>)> {
    init_with(
        options,
        &ConfigAssembler::new(),
        Arc::new(LifecycleManager::default()),
        on_interrupt,
    )
    .await
}

/// [`init`] with explicit collaborators
pub async fn init_with(
    options: &InitOptions,
    assembler: &ConfigAssembler,
    lifecycle: Arc<LifecycleManager>,
    on_interrupt: Option<InterruptCallback>,
) -> InitResult<(Configuration, Arc<LifecycleManager>)> {
    lifecycle.start(options.cpu_profile_path.as_deref())?;
    lifecycle.spawn_interrupt_listener(options.mem_profile_path.clone(), on_interrupt);

    let config = match assembler
        .assemble(&options.local_user, &options.storage_root)
        .await
    {
        Ok(config) => config,
        Err(e) => {
            lifecycle.stop_interrupt_listener();
            return Err(e);
        }
    };
    info!(user = %options.local_user, "KBFS client initialized");
    Ok((config, lifecycle))
}
