//! Clients of the local identity daemon.
//!
//! The daemon holds the device keys. Identity lookups, signing and
//! decryption are delegated to it; verification and sealing to a public key
//! only need public material and run in-process.

use crate::config::ReliabilityConfig;
use crate::crypto::{seal_to, verify_signature};
use crate::rpc::RpcClient;
use async_trait::async_trait;
use kbfs_core::{
    Codec, CryptoError, CryptoOps, IdentityError, IdentityVerifier, ServerError, SignatureInfo,
    Uid, UserInfo,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Requests understood by the identity daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonRequest {
    /// UID of the logged-in user
    CurrentUid,
    /// Resolve a username or assertion
    Resolve {
        /// Username or assertion
        assertion: String,
    },
    /// Public info for a user
    UserInfo {
        /// User to look up
        uid: Uid,
    },
    /// Sign with the device signing key
    Sign {
        /// Message to sign
        message: Vec<u8>,
    },
    /// Open data sealed to the device encryption key
    Decrypt {
        /// Sealed bytes
        sealed: Vec<u8>,
    },
}

async fn connect(
    codec: Codec,
    addr: &str,
    reliability: ReliabilityConfig,
) -> Result<Arc<RpcClient>, ServerError> {
    let rpc = Arc::new(RpcClient::new(addr, codec, reliability));
    rpc.connect().await?;
    rpc.spawn_reconnect();
    Ok(rpc)
}

/// Identity verification through the daemon
pub struct KbpkiClient {
    rpc: Arc<RpcClient>,
}

impl KbpkiClient {
    /// Connect to the daemon; fails if it is not reachable
    pub async fn connect(
        codec: Codec,
        addr: &str,
        reliability: ReliabilityConfig,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            rpc: connect(codec, addr, reliability).await?,
        })
    }
}

fn identity_err(e: ServerError) -> IdentityError {
    IdentityError::Service(e.to_string())
}

#[async_trait]
impl IdentityVerifier for KbpkiClient {
    async fn current_uid(&self) -> Result<Uid, IdentityError> {
        self.rpc
            .call(&DaemonRequest::CurrentUid)
            .await
            .map_err(identity_err)
    }

    async fn resolve(&self, assertion: &str) -> Result<Uid, IdentityError> {
        let found: Option<Uid> = self
            .rpc
            .call(&DaemonRequest::Resolve {
                assertion: assertion.to_string(),
            })
            .await
            .map_err(identity_err)?;
        found.ok_or_else(|| IdentityError::NoSuchUser(assertion.to_string()))
    }

    async fn user_info(&self, uid: Uid) -> Result<UserInfo, IdentityError> {
        let found: Option<UserInfo> = self
            .rpc
            .call(&DaemonRequest::UserInfo { uid })
            .await
            .map_err(identity_err)?;
        found.ok_or_else(|| IdentityError::UnknownUid(uid.to_string()))
    }
}

/// Crypto operations backed by the daemon's device keys
pub struct CryptoClient {
    codec: Codec,
    rpc: Arc<RpcClient>,
}

impl CryptoClient {
    /// Connect to the daemon; fails if it is not reachable
    pub async fn connect(
        codec: Codec,
        addr: &str,
        reliability: ReliabilityConfig,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            codec,
            rpc: connect(codec, addr, reliability).await?,
        })
    }
}

fn crypto_err(e: ServerError) -> CryptoError {
    CryptoError::Service(e.to_string())
}

#[async_trait]
impl CryptoOps for CryptoClient {
    async fn sign(&self, message: &[u8]) -> Result<SignatureInfo, CryptoError> {
        self.rpc
            .call(&DaemonRequest::Sign {
                message: message.to_vec(),
            })
            .await
            .map_err(crypto_err)
    }

    async fn verify(&self, message: &[u8], signature: &SignatureInfo) -> Result<(), CryptoError> {
        verify_signature(message, signature)
    }

    async fn encrypt_for(
        &self,
        public_key: &[u8; 32],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        seal_to(&self.codec, public_key, plaintext)
    }

    async fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.rpc
            .call(&DaemonRequest::Decrypt {
                sealed: sealed.to_vec(),
            })
            .await
            .map_err(crypto_err)
    }
}
