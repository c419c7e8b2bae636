//! # KBFS Core - Capability Contracts
//!
//! Shared vocabulary for the KBFS client bootstrap layers:
//!
//! - **Tier capabilities**: [`MetadataServer`], [`KeyServer`], [`BlockServer`],
//!   and [`RemoteServer`] for a networked peer that serves both the metadata
//!   and key roles
//! - **Identity capabilities**: [`IdentityVerifier`] and [`CryptoOps`]
//! - **Storage location**: [`StorageRoot`] (tri-state root) and [`TierStorage`]
//!   (what a constructed tier is actually backed by)
//! - **Encoding**: [`Codec`]
//! - **Diagnostics**: [`Profiler`]
//! - **Construction contracts**: [`TierBuilder`] and [`IdentityService`], the
//!   seams through which bootstrap code obtains concrete collaborators
//!
//! Nothing in this crate touches the process environment, the filesystem or
//! the network. Concrete implementations live in `kbfs-servers`; wiring lives
//! in `kbfs-init`.

pub mod codec;
pub mod errors;
pub mod identifiers;
pub mod identity;
pub mod profiling;
pub mod provision;
pub mod servers;
pub mod storage_root;

pub use codec::Codec;
pub use errors::{CryptoError, IdentityError, ServerError, ServerResult};
pub use identifiers::{BlockId, KeyHalfId, TlfId, Uid};
pub use identity::{CryptoOps, EncryptedData, IdentityVerifier, SignatureInfo, UserInfo};
pub use profiling::Profiler;
pub use provision::{IdentityService, MetadataLayout, TierBuilder};
pub use servers::{BlockServer, KeyServer, MdRecord, MetadataServer, RemoteServer, Tier};
pub use storage_root::{StorageRoot, TierStorage};
