//! Identity verification and crypto capabilities.

use crate::errors::{CryptoError, IdentityError};
use crate::identifiers::Uid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Public information about a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Username
    pub name: String,
    /// User identifier
    pub uid: Uid,
    /// Ed25519 verifying key
    pub verifying_key: [u8; 32],
    /// X25519 public encryption key
    pub crypt_public_key: [u8; 32],
}

/// A detached signature with the key that made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    /// Signature bytes
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    /// Ed25519 verifying key of the signer
    pub verifying_key: [u8; 32],
}

/// Data sealed to a public encryption key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Ephemeral X25519 public key of the sender
    pub ephemeral_public_key: [u8; 32],
    /// ChaCha20-Poly1305 nonce
    pub nonce: [u8; 12],
    /// Ciphertext with authentication tag
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Identity verification capability
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// UID of the user this process runs as
    async fn current_uid(&self) -> Result<Uid, IdentityError>;

    /// Resolve a username or external assertion (e.g. `twitter:alice`)
    async fn resolve(&self, assertion: &str) -> Result<Uid, IdentityError>;

    /// Public information about a user
    async fn user_info(&self, uid: Uid) -> Result<UserInfo, IdentityError>;
}

/// Sign/verify and encrypt/decrypt bound to the current user's key pair
#[async_trait]
pub trait CryptoOps: Send + Sync {
    /// Sign a message with the current user's signing key
    async fn sign(&self, message: &[u8]) -> Result<SignatureInfo, CryptoError>;

    /// Verify a signature made by any key
    async fn verify(&self, message: &[u8], signature: &SignatureInfo) -> Result<(), CryptoError>;

    /// Seal `plaintext` to an X25519 public key
    async fn encrypt_for(
        &self,
        public_key: &[u8; 32],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Open data sealed to the current user's encryption key
    async fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
