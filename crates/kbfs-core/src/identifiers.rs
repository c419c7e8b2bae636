//! Identifiers shared across tiers and identity providers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub [u8; 16]);

impl Uid {
    /// UID suffix marking a user identifier
    pub const SUFFIX: u8 = 0x19;

    /// Build a test UID from a small integer.
    ///
    /// The integer is stored big-endian in the leading bytes so that test
    /// UIDs sort by index; the trailing byte carries [`Uid::SUFFIX`].
    pub fn from_test_index(index: u32) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&index.to_be_bytes());
        bytes[15] = Self::SUFFIX;
        Self(bytes)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Top-level folder identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TlfId(pub [u8; 16]);

impl TlfId {
    /// Derive a folder id from its canonical handle string
    pub fn from_handle(handle: &str) -> Self {
        let digest = blake3::derive_key("kbfs tlf id v1", handle.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }
}

impl fmt::Display for TlfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Content-addressed block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 32]);

impl BlockId {
    /// Compute the id of a block from its encoded contents
    pub fn for_contents(contents: &[u8]) -> Self {
        Self(*blake3::hash(contents).as_bytes())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Identifier of a server-side key half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyHalfId(pub [u8; 32]);

impl fmt::Display for KeyHalfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uids_are_distinct_per_index() {
        assert_ne!(Uid::from_test_index(1), Uid::from_test_index(2));
        assert_eq!(Uid::from_test_index(3).0[15], Uid::SUFFIX);
        assert!(Uid::from_test_index(1) < Uid::from_test_index(2));
    }

    #[test]
    fn test_block_id_is_content_addressed() {
        assert_eq!(BlockId::for_contents(b"abc"), BlockId::for_contents(b"abc"));
        assert_ne!(BlockId::for_contents(b"abc"), BlockId::for_contents(b"abd"));
    }

    #[test]
    fn test_tlf_id_display_is_hex() {
        let id = TlfId::from_handle("strib,max");
        assert_eq!(id.to_string().len(), 32);
    }
}
