//! Storage root descriptor and the backing a constructed tier reports.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the local tiers keep their state.
///
/// "No root" and "root is the empty string" are different things: the first
/// means nothing survives the process, the second means persist relative to
/// the current working directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageRoot {
    /// In-memory only
    #[default]
    Ephemeral,
    /// Persistent, rooted at the current working directory
    WorkingDir,
    /// Persistent, rooted at the given directory
    Path(PathBuf),
}

impl StorageRoot {
    /// Build a root from an optional path string.
    ///
    /// `None` is ephemeral, `Some("")` is the working directory and anything
    /// else is an explicit path.
    pub fn from_option(root: Option<&str>) -> Self {
        match root {
            None => Self::Ephemeral,
            Some("") => Self::WorkingDir,
            Some(path) => Self::Path(PathBuf::from(path)),
        }
    }

    /// Directory to persist under, or `None` when ephemeral.
    ///
    /// The working-directory root resolves to an empty relative path so that
    /// joined sub-paths stay relative to wherever the process runs.
    pub fn dir(&self) -> Option<&Path> {
        match self {
            Self::Ephemeral => None,
            Self::WorkingDir => Some(Path::new("")),
            Self::Path(path) => Some(path.as_path()),
        }
    }

    /// Whether tiers built from this root are in-memory only
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral)
    }
}

/// What a constructed tier is backed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierStorage {
    /// In-memory, lost on exit
    Ephemeral,
    /// Disk-backed under the listed directories
    Persistent(Vec<PathBuf>),
    /// Client of a networked peer
    Remote(String),
}

impl TierStorage {
    /// Whether the tier is in-memory only
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_root_is_not_ephemeral() {
        assert_eq!(StorageRoot::from_option(None), StorageRoot::Ephemeral);
        assert_eq!(StorageRoot::from_option(Some("")), StorageRoot::WorkingDir);
        assert_eq!(
            StorageRoot::from_option(Some("/tmp/x")),
            StorageRoot::Path(PathBuf::from("/tmp/x"))
        );
    }

    #[test]
    fn test_working_dir_joins_relative() {
        let root = StorageRoot::WorkingDir;
        let joined = root.dir().map(|d| d.join("kbfs_block"));
        assert_eq!(joined, Some(PathBuf::from("kbfs_block")));
        assert!(StorageRoot::Ephemeral.dir().is_none());
    }
}
