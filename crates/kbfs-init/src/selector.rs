//! Backend mode selection.
//!
//! One environment-provided address decides whether the metadata tier is
//! local or remote. The key tier has no mode of its own: the remote metadata
//! peer also serves keys, so key mode is always derived from metadata mode.

use std::env;
use tracing::debug;

/// Environment variable holding the remote metadata server address
pub const ENV_MDSERVER_ADDR: &str = "KEYBASE_MDSERVER_BIND_ADDR";

/// Whether a tier runs in-process or against a networked peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMode {
    /// In-process, ephemeral or disk-persistent
    Local,
    /// Client of the peer at `addr`
    Remote {
        /// Peer address
        addr: String,
    },
}

impl BackendMode {
    /// Mode for an optional address: absent or empty means local
    pub fn from_addr(addr: Option<&str>) -> Self {
        match addr {
            Some(addr) if !addr.is_empty() => Self::Remote {
                addr: addr.to_string(),
            },
            _ => Self::Local,
        }
    }

    /// Whether this is local mode
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Key server mode for a given metadata mode
pub fn key_server_mode(metadata: &BackendMode) -> BackendMode {
    metadata.clone()
}

#[derive(Debug, Clone)]
enum AddrSource {
    Env(String),
    Fixed(Option<String>),
}

/// Decides the metadata backend mode
#[derive(Debug, Clone)]
pub struct BackendSelector {
    source: AddrSource,
}

impl BackendSelector {
    /// Read the address from [`ENV_MDSERVER_ADDR`]
    pub fn from_env() -> Self {
        Self::with_env_var(ENV_MDSERVER_ADDR)
    }

    /// Read the address from another environment variable
    pub fn with_env_var(name: impl Into<String>) -> Self {
        Self {
            source: AddrSource::Env(name.into()),
        }
    }

    /// Use a fixed address instead of the environment
    pub fn fixed(addr: Option<&str>) -> Self {
        Self {
            source: AddrSource::Fixed(addr.map(str::to_string)),
        }
    }

    /// Metadata server mode
    pub fn decide_mode(&self) -> BackendMode {
        let addr = match &self.source {
            // Non-UTF-8 values still count as set.
            AddrSource::Env(name) => env::var_os(name).map(|v| v.to_string_lossy().into_owned()),
            AddrSource::Fixed(addr) => addr.clone(),
        };
        let mode = BackendMode::from_addr(addr.as_deref());
        debug!(?mode, "selected metadata backend mode");
        mode
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::from_env()
    }
}
