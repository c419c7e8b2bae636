//! # KBFS Servers - Reference Tier Implementations
//!
//! Concrete implementations of the `kbfs-core` capability traits:
//!
//! - [`MdServerLocal`], [`KeyServerLocal`], [`BlockServerLocal`]: in-process
//!   tiers, either in-memory or persisted under a directory per store
//! - [`MdServerRemote`]: client of a networked metadata peer that also serves
//!   the key-server role
//! - [`KbpkiClient`], [`CryptoClient`]: clients of the local identity daemon
//! - [`StandardTiers`]: the default `TierBuilder` over all of the above
//!
//! Remote clients share one framed transport ([`rpc`]) whose connection is
//! established and re-established in the background; constructing a remote
//! tier never fails.

pub mod blockserver;
pub mod builder;
pub mod config;
pub mod crypto;
pub mod daemon;
pub mod keyserver;
pub mod mdserver;
pub mod remote;
pub mod rpc;
pub mod store;

pub use blockserver::BlockServerLocal;
pub use builder::StandardTiers;
pub use config::ReliabilityConfig;
pub use daemon::{CryptoClient, DaemonRequest, KbpkiClient};
pub use keyserver::KeyServerLocal;
pub use mdserver::MdServerLocal;
pub use remote::{MdRequest, MdServerRemote};
