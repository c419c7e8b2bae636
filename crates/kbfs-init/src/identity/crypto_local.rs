//! Crypto bound to a fixture user's keys

use super::local_users::LocalUser;
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use kbfs_core::{Codec, CryptoError, CryptoOps, SignatureInfo};
use kbfs_servers::crypto::{open_with, seal_to, verify_signature};
use zeroize::Zeroizing;

/// Signing and sealing with deterministic keys, no network
pub struct CryptoLocal {
    codec: Codec,
    signing_key: SigningKey,
    crypt_secret: Zeroizing<[u8; 32]>,
}

impl CryptoLocal {
    /// Crypto for `user`
    pub fn new(codec: Codec, user: &LocalUser) -> Self {
        Self {
            codec,
            signing_key: user.signing_key().clone(),
            crypt_secret: Zeroizing::new(*user.crypt_secret()),
        }
    }
}

#[async_trait]
impl CryptoOps for CryptoLocal {
    async fn sign(&self, message: &[u8]) -> Result<SignatureInfo, CryptoError> {
        let signature = self.signing_key.sign(message);
        Ok(SignatureInfo {
            signature: signature.to_bytes().to_vec(),
            verifying_key: self.signing_key.verifying_key().to_bytes(),
        })
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
        open_with(&self.codec, &self.crypt_secret, sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_then_verify() {
        let user = LocalUser::by_name("chris").unwrap();
        let crypto = CryptoLocal::new(Codec::default(), &user);

        let sig = crypto.sign(b"md revision 7").await.unwrap();
        assert_eq!(sig.verifying_key, user.user_info().verifying_key);
        crypto.verify(b"md revision 7", &sig).await.unwrap();
        assert!(matches!(
            crypto.verify(b"md revision 8", &sig).await,
            Err(CryptoError::VerificationFailed)
        ));
    }

    #[tokio::test]
    async fn test_sealed_data_opens_only_for_recipient() {
        let codec = Codec::default();
        let strib = LocalUser::by_name("strib").unwrap();
        let fred = LocalUser::by_name("fred").unwrap();
        let sender = CryptoLocal::new(codec, &strib);
        let recipient = CryptoLocal::new(codec, &fred);

        let sealed = sender
            .encrypt_for(&fred.user_info().crypt_public_key, b"tlf key half")
            .await
            .unwrap();
        assert_eq!(recipient.decrypt(&sealed).await.unwrap(), b"tlf key half");
        assert!(sender.decrypt(&sealed).await.is_err());
    }
}
