//! Public-key primitives shared by the local and networked crypto providers.
//!
//! Sealing uses an ephemeral X25519 key agreement with the recipient's public
//! key, BLAKE3 key derivation and ChaCha20-Poly1305. The sealed form is an
//! [`EncryptedData`] encoded with the [`Codec`].

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use curve25519_dalek::montgomery::MontgomeryPoint;
use ed25519_dalek::{Signature, VerifyingKey};
use kbfs_core::{Codec, CryptoError, EncryptedData, SignatureInfo};
use rand::RngCore;
use zeroize::Zeroizing;

const BOX_KEY_CONTEXT: &str = "kbfs box key v1";

/// X25519 public key for a crypt secret
pub fn crypt_public_key(secret: &[u8; 32]) -> [u8; 32] {
    MontgomeryPoint::mul_base_clamped(*secret).to_bytes()
}

/// Verify a detached Ed25519 signature
pub fn verify_signature(message: &[u8], info: &SignatureInfo) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(&info.verifying_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let bytes: [u8; 64] = info
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature("signature must be 64 bytes".into()))?;
    key.verify_strict(message, &Signature::from_bytes(&bytes))
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Seal `plaintext` to an X25519 public key
pub fn seal_to(
    codec: &Codec,
    recipient_public: &[u8; 32],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut ephemeral_secret = Zeroizing::new([0u8; 32]);
    rand::thread_rng().fill_bytes(&mut *ephemeral_secret);
    let ephemeral_public = crypt_public_key(&ephemeral_secret);

    let key = box_key(&ephemeral_secret, recipient_public, &ephemeral_public, recipient_public)?;
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&*key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    codec
        .encode(&EncryptedData {
            ephemeral_public_key: ephemeral_public,
            nonce,
            ciphertext,
        })
        .map_err(CryptoError::Codec)
}

/// Open data sealed to the public key of `secret`
pub fn open_with(codec: &Codec, secret: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let data: EncryptedData = codec.decode(sealed).map_err(CryptoError::Codec)?;
    let own_public = crypt_public_key(secret);
    let key = box_key(secret, &data.ephemeral_public_key, &data.ephemeral_public_key, &own_public)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&*key));
    cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_slice())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

fn box_key(
    secret: &[u8; 32],
    peer_public: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let shared = Zeroizing::new(MontgomeryPoint(*peer_public).mul_clamped(*secret).to_bytes());
    if shared.iter().all(|b| *b == 0) {
        return Err(CryptoError::InvalidKey("low-order public key".into()));
    }

    let mut material = Zeroizing::new(Vec::with_capacity(96));
    material.extend_from_slice(&*shared);
    material.extend_from_slice(ephemeral_public);
    material.extend_from_slice(recipient_public);
    Ok(Zeroizing::new(blake3::derive_key(BOX_KEY_CONTEXT, &material)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn test_sealed_data_opens_only_with_matching_secret() {
        let codec = Codec::new();
        let secret = [7u8; 32];
        let other = [9u8; 32];

        let sealed = seal_to(&codec, &crypt_public_key(&secret), b"folder key").unwrap();
        assert_eq!(open_with(&codec, &secret, &sealed).unwrap(), b"folder key");
        assert!(matches!(
            open_with(&codec, &other, &sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_verify_rejects_other_message() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let info = SignatureInfo {
            signature: key.sign(b"md").to_bytes().to_vec(),
            verifying_key: key.verifying_key().to_bytes(),
        };
        assert!(verify_signature(b"md", &info).is_ok());
        assert!(matches!(
            verify_signature(b"other", &info),
            Err(CryptoError::VerificationFailed)
        ));
    }

    #[test]
    fn test_zero_public_key_is_rejected() {
        let result = seal_to(&Codec::new(), &[0u8; 32], b"x");
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }
}
