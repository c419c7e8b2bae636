//! Bootstrap error types
//!
//! Every construction failure is tagged with the stage that produced it so
//! callers can tell which step failed without inspecting the cause.

use kbfs_core::ServerError;
use std::path::PathBuf;

/// Errors from assembling a [`crate::Configuration`] or running [`crate::init`]
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// Metadata server construction failed
    #[error("problem creating MD server: {0}")]
    MetadataServer(#[source] ServerError),

    /// Key server construction failed
    #[error("problem creating key server: {0}")]
    KeyServer(#[source] ServerError),

    /// Block server construction failed
    #[error("cannot open block database: {0}")]
    BlockServer(#[source] ServerError),

    /// Local user name is not one of the fixtures
    #[error("user {name} not in list {valid:?}")]
    UnknownLocalUser {
        /// Name that was requested
        name: String,
        /// All fixture names
        valid: Vec<String>,
    },

    /// Identity daemon session could not be configured
    #[error("could not configure identity session: {0}")]
    Session(#[source] ServerError),

    /// Networked identity verification client could not be created
    #[error("Could not get KBPKI: {0}")]
    Kbpki(#[source] ServerError),

    /// Networked crypto client could not be created
    #[error("Could not get Crypto: {0}")]
    Crypto(#[source] ServerError),

    /// Profiling could not be started
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Init result type
pub type InitResult<T> = std::result::Result<T, InitError>;

/// Errors from starting profiling or writing the shutdown snapshot
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// CPU profile target could not be created
    #[error("cannot create CPU profile {}: {source}", path.display())]
    CpuProfile {
        /// Requested target
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Heap snapshot target could not be created
    #[error("cannot create heap snapshot {}: {source}", path.display())]
    HeapSnapshot {
        /// Requested target
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// Profiling was already started
    #[error("CPU profiling is already active")]
    AlreadyProfiling,

    /// The profiler could not begin sampling
    #[error("profiler failed to start: {0}")]
    Profiler(String),
}

impl InitError {
    /// Name of the stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MetadataServer(_) => "metadata server",
            Self::KeyServer(_) => "key server",
            Self::BlockServer(_) => "block server",
            Self::UnknownLocalUser { .. } | Self::Session(_) | Self::Kbpki(_) | Self::Crypto(_) => {
                "identity"
            }
            Self::Lifecycle(_) => "lifecycle",
        }
    }
}
