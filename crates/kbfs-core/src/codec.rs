//! Canonical encoding used for sealed data, stored records and RPC frames.

use serde::{de::DeserializeOwned, Serialize};

/// CBOR codec.
///
/// Stateless and cheap to clone; a single instance is shared by the
/// configuration and handed to every crypto provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec;

impl Codec {
    /// Create a codec
    pub fn new() -> Self {
        Self
    }

    /// Encode a value
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, String> {
        serde_cbor::to_vec(value).map_err(|e| e.to_string())
    }

    /// Decode a value
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String> {
        serde_cbor::from_slice(bytes).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = Codec::new();
        let result: Result<(u64, String), _> = codec.decode(&[0xff, 0x00, 0x13]);
        assert!(result.is_err());
    }
}
