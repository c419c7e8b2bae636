//! Networked identity provider double

use async_trait::async_trait;
use kbfs_core::{
    Codec, CryptoError, CryptoOps, IdentityError, IdentityService, IdentityVerifier, ServerError,
    ServerResult, SignatureInfo, Uid, UserInfo,
};
use kbfs_servers::crypto::{crypt_public_key, open_with, seal_to, verify_signature};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Test index of the UID reported by the mock session
pub const MOCK_UID_INDEX: u32 = 1000;

const MOCK_USER: &str = "mock_device_user";
const MOCK_CRYPT_SECRET: [u8; 32] = [7u8; 32];

/// One step of the networked identity path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum IdentityStage {
    Session,
    Kbpki,
    Crypto,
}

/// An [`IdentityService`] that counts calls and fails on request
#[derive(Default)]
pub struct MockIdentityService {
    calls: Mutex<HashMap<IdentityStage, usize>>,
    failing: HashSet<IdentityStage>,
}

impl MockIdentityService {
    /// Service that succeeds at every stage
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stage` fail as if the daemon were unreachable
    pub fn fail_on(mut self, stage: IdentityStage) -> Self {
        self.failing.insert(stage);
        self
    }

    /// Times `stage` was entered
    pub fn calls(&self, stage: IdentityStage) -> usize {
        self.calls.lock().get(&stage).copied().unwrap_or(0)
    }

    /// Calls across all stages
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn record(&self, stage: IdentityStage) -> ServerResult<()> {
        *self.calls.lock().entry(stage).or_insert(0) += 1;
        if self.failing.contains(&stage) {
            return Err(ServerError::unavailable(
                "mock-daemon",
                format!("injected {stage:?} failure"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityService for MockIdentityService {
    async fn configure_session(&self) -> ServerResult<()> {
        self.record(IdentityStage::Session)
    }

    async fn kbpki(&self) -> ServerResult<Arc<dyn IdentityVerifier>> {
        self.record(IdentityStage::Kbpki)?;
        Ok(Arc::new(MockVerifier))
    }

    async fn crypto(&self, codec: Codec) -> ServerResult<Arc<dyn CryptoOps>> {
        self.record(IdentityStage::Crypto)?;
        Ok(Arc::new(MockCrypto { codec }))
    }
}

struct MockVerifier;

fn mock_user() -> UserInfo {
    UserInfo {
        name: MOCK_USER.to_string(),
        uid: Uid::from_test_index(MOCK_UID_INDEX),
        verifying_key: [0u8; 32],
        crypt_public_key: crypt_public_key(&MOCK_CRYPT_SECRET),
    }
}

#[async_trait]
impl IdentityVerifier for MockVerifier {
    async fn current_uid(&self) -> Result<Uid, IdentityError> {
        Ok(Uid::from_test_index(MOCK_UID_INDEX))
    }

    async fn resolve(&self, assertion: &str) -> Result<Uid, IdentityError> {
        if assertion == MOCK_USER {
            return Ok(Uid::from_test_index(MOCK_UID_INDEX));
        }
        Err(IdentityError::NoSuchUser(assertion.to_string()))
    }

    async fn user_info(&self, uid: Uid) -> Result<UserInfo, IdentityError> {
        let user = mock_user();
        if uid != user.uid {
            return Err(IdentityError::UnknownUid(uid.to_string()));
        }
        Ok(user)
    }
}

struct MockCrypto {
    codec: Codec,
}

#[async_trait]
impl CryptoOps for MockCrypto {
    async fn sign(&self, _message: &[u8]) -> Result<SignatureInfo, CryptoError> {
        Err(CryptoError::Service("mock device has no signing key".into()))
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
        open_with(&self.codec, &MOCK_CRYPT_SECRET, sealed)
    }
}
