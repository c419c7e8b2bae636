//! The fixed registry of offline fixture users.
//!
//! Keys are derived from the user name alone, so every process that runs as
//! `strib` signs with the same key. Nothing here is secret.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use kbfs_core::{IdentityError, IdentityVerifier, Uid, UserInfo};
use kbfs_servers::crypto::crypt_public_key;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

const SIGNING_KEY_PREFIX: &str = "kbfs local user signing key:";
const CRYPT_KEY_PREFIX: &str = "kbfs local user crypt key:";

/// Fixture names and the one external assertion each carries
pub const LOCAL_USERS: [(&str, &str); 4] = [
    ("strib", "github:strib"),
    ("max", "twitter:maxtaco"),
    ("chris", "twitter:malgorithms"),
    ("fred", "twitter:fakalin"),
];

/// All fixture names, in registry order
pub fn local_user_names() -> Vec<String> {
    LOCAL_USERS.iter().map(|(name, _)| (*name).to_string()).collect()
}

/// A deterministic identity for offline use
#[derive(Clone)]
pub struct LocalUser {
    /// Username
    pub name: String,
    /// Test UID derived from the registry position
    pub uid: Uid,
    /// External assertions proven by this user
    pub asserts: Vec<String>,
    signing_key: SigningKey,
    crypt_secret: Zeroizing<[u8; 32]>,
}

impl LocalUser {
    /// Look up a fixture by name
    pub fn by_name(name: &str) -> Option<Self> {
        LOCAL_USERS
            .iter()
            .zip(1u32..)
            .find(|((candidate, _), _)| *candidate == name)
            .map(|((name, assertion), index)| Self::build(name, index, assertion))
    }

    fn build(name: &str, index: u32, assertion: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: Uid::from_test_index(index),
            asserts: vec![assertion.to_string()],
            signing_key: SigningKey::from_bytes(&seeded(SIGNING_KEY_PREFIX, name)),
            crypt_secret: Zeroizing::new(seeded(CRYPT_KEY_PREFIX, name)),
        }
    }

    /// Ed25519 signing key
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// X25519 secret key
    pub fn crypt_secret(&self) -> &[u8; 32] {
        &self.crypt_secret
    }

    /// Public view of this user
    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            name: self.name.clone(),
            uid: self.uid,
            verifying_key: self.signing_key.verifying_key().to_bytes(),
            crypt_public_key: crypt_public_key(&self.crypt_secret),
        }
    }
}

impl fmt::Debug for LocalUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalUser")
            .field("name", &self.name)
            .field("uid", &self.uid)
            .field("asserts", &self.asserts)
            .finish_non_exhaustive()
    }
}

fn seeded(prefix: &str, name: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(name.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    seed
}

/// Every fixture user, in registry order
pub fn make_local_users() -> Vec<LocalUser> {
    LOCAL_USERS
        .iter()
        .zip(1u32..)
        .map(|((name, assertion), index)| LocalUser::build(name, index, assertion))
        .collect()
}

/// Identity verification over the fixture registry
#[derive(Debug)]
pub struct KbpkiLocal {
    users: Vec<LocalUser>,
    current: Uid,
}

impl KbpkiLocal {
    /// Verifier over `users`, running as `current`
    pub fn new(users: Vec<LocalUser>, current: Uid) -> Self {
        Self { users, current }
    }

    fn find(&self, uid: Uid) -> Option<&LocalUser> {
        self.users.iter().find(|user| user.uid == uid)
    }
}

#[async_trait]
impl IdentityVerifier for KbpkiLocal {
    async fn current_uid(&self) -> Result<Uid, IdentityError> {
        Ok(self.current)
    }

    async fn resolve(&self, assertion: &str) -> Result<Uid, IdentityError> {
        self.users
            .iter()
            .find(|user| user.name == assertion || user.asserts.iter().any(|a| a == assertion))
            .map(|user| user.uid)
            .ok_or_else(|| IdentityError::NoSuchUser(assertion.to_string()))
    }

    async fn user_info(&self, uid: Uid) -> Result<UserInfo, IdentityError> {
        self.find(uid)
            .map(LocalUser::user_info)
            .ok_or_else(|| IdentityError::UnknownUid(uid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_stable_per_name() {
        let a = LocalUser::by_name("max").unwrap();
        let b = LocalUser::by_name("max").unwrap();
        let other = LocalUser::by_name("fred").unwrap();

        assert_eq!(a.user_info(), b.user_info());
        assert_ne!(a.user_info().verifying_key, other.user_info().verifying_key);
        assert_ne!(a.user_info().crypt_public_key, other.user_info().crypt_public_key);
    }

    #[test]
    fn test_uids_follow_registry_order() {
        let users = make_local_users();
        let uids: Vec<Uid> = users.iter().map(|u| u.uid).collect();
        assert_eq!(
            uids,
            (1..=4).map(Uid::from_test_index).collect::<Vec<_>>()
        );
        assert!(LocalUser::by_name("nobody").is_none());
        assert!(LocalUser::by_name("").is_none());
    }

    #[tokio::test]
    async fn test_kbpki_resolves_names_and_assertions() {
        let users = make_local_users();
        let current = users[0].uid;
        let kbpki = KbpkiLocal::new(users, current);

        assert_eq!(kbpki.current_uid().await.unwrap(), current);
        assert_eq!(kbpki.resolve("strib").await.unwrap(), current);
        assert_eq!(
            kbpki.resolve("twitter:malgorithms").await.unwrap(),
            Uid::from_test_index(3)
        );
        assert!(matches!(
            kbpki.resolve("twitter:strib").await,
            Err(IdentityError::NoSuchUser(_))
        ));

        let info = kbpki.user_info(Uid::from_test_index(2)).await.unwrap();
        assert_eq!(info.name, "max");
        assert!(matches!(
            kbpki.user_info(Uid::from_test_index(9)).await,
            Err(IdentityError::UnknownUid(_))
        ));
    }
}
