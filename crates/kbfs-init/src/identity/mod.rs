//! Identity provisioning.
//!
//! An empty local-user name selects the networked identity daemon; any other
//! name must be one of the four fixtures in [`LOCAL_USERS`], which never touch
//! the network.

mod crypto_local;
mod local_users;
mod networked;

pub use crypto_local::CryptoLocal;
pub use local_users::{local_user_names, make_local_users, KbpkiLocal, LocalUser, LOCAL_USERS};
pub use networked::{
    parse_service_addr, DaemonIdentityService, DEFAULT_SERVICE_ADDR, ENV_SERVICE_ADDR,
};

use crate::error::{InitError, InitResult};
use kbfs_core::{Codec, CryptoOps, IdentityService, IdentityVerifier};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Identity and crypto handles produced by [`IdentityProvisioner`]
#[derive(Clone)]
pub struct ProvisionedIdentity {
    /// Identity verification
    pub kbpki: Arc<dyn IdentityVerifier>,
    /// Crypto bound to the current user's keys
    pub crypto: Arc<dyn CryptoOps>,
    /// The fixture in use, if any
    pub local_user: Option<LocalUser>,
}

impl fmt::Debug for ProvisionedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedIdentity")
            .field("local_user", &self.local_user)
            .finish_non_exhaustive()
    }
}

/// Builds the identity verifier and crypto provider
#[derive(Clone)]
pub struct IdentityProvisioner {
    service: Arc<dyn IdentityService>,
}

impl IdentityProvisioner {
    /// Provisioner using `service` for the networked path
    pub fn new(service: Arc<dyn IdentityService>) -> Self {
        Self { service }
    }

    /// Build identity handles for `local_user`, or the daemon when empty
    pub async fn build_identity(
        &self,
        local_user: &str,
        codec: Codec,
    ) -> InitResult<ProvisionedIdentity> {
        if local_user.is_empty() {
            return self.build_networked(codec).await;
        }
        build_fixture(local_user, codec)
    }

    async fn build_networked(&self, codec: Codec) -> InitResult<ProvisionedIdentity> {
        self.service
            .configure_session()
            .await
            .map_err(InitError::Session)?;
        let kbpki = self.service.kbpki().await.map_err(InitError::Kbpki)?;
        let crypto = self.service.crypto(codec).await.map_err(InitError::Crypto)?;
        debug!("provisioned networked identity");
        Ok(ProvisionedIdentity {
            kbpki,
            crypto,
            local_user: None,
        })
    }
}

impl Default for IdentityProvisioner {
    fn default() -> Self {
        Self::new(Arc::new(DaemonIdentityService::default()))
    }
}

impl fmt::Debug for IdentityProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityProvisioner").finish_non_exhaustive()
    }
}

fn build_fixture(name: &str, codec: Codec) -> InitResult<ProvisionedIdentity> {
    let user = LocalUser::by_name(name).ok_or_else(|| InitError::UnknownLocalUser {
        name: name.to_string(),
        valid: local_user_names(),
    })?;

    let kbpki = KbpkiLocal::new(make_local_users(), user.uid);
    let crypto = CryptoLocal::new(codec, &user);
    info!(user = %user.name, uid = %user.uid, "using local fixture identity");
    Ok(ProvisionedIdentity {
        kbpki: Arc::new(kbpki),
        crypto: Arc::new(crypto),
        local_user: Some(user),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbfs_testkit::{IdentityStage, MockIdentityService};

    #[tokio::test]
    async fn test_fixture_path_skips_the_daemon() {
        let service = Arc::new(MockIdentityService::new());
        let provisioner = IdentityProvisioner::new(service.clone());

        let identity = provisioner.build_identity("max", Codec::default()).await.unwrap();
        let user = identity.local_user.unwrap();
        assert_eq!(user.asserts, vec!["twitter:maxtaco".to_string()]);
        assert_eq!(identity.kbpki.current_uid().await.unwrap(), user.uid);
        assert_eq!(service.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_names_the_valid_set() {
        let provisioner = IdentityProvisioner::new(Arc::new(MockIdentityService::new()));
        let err = provisioner.build_identity("nobody", Codec::default()).await.unwrap_err();

        match &err {
            InitError::UnknownLocalUser { name, valid } => {
                assert_eq!(name, "nobody");
                assert_eq!(valid, &["strib", "max", "chris", "fred"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "user nobody not in list [\"strib\", \"max\", \"chris\", \"fred\"]");
    }

    #[tokio::test]
    async fn test_networked_failures_name_the_subsystem() {
        let service = Arc::new(MockIdentityService::new().fail_on(IdentityStage::Kbpki));
        let provisioner = IdentityProvisioner::new(service.clone());
        let err = provisioner.build_identity("", Codec::default()).await.unwrap_err();
        assert!(matches!(err, InitError::Kbpki(_)));
        assert_eq!(service.calls(IdentityStage::Crypto), 0);

        let service = Arc::new(MockIdentityService::new().fail_on(IdentityStage::Crypto));
        let provisioner = IdentityProvisioner::new(service.clone());
        let err = provisioner.build_identity("", Codec::default()).await.unwrap_err();
        assert!(matches!(err, InitError::Crypto(_)));
        assert!(err.to_string().starts_with("Could not get Crypto"));

        let service = Arc::new(MockIdentityService::new().fail_on(IdentityStage::Session));
        let provisioner = IdentityProvisioner::new(service.clone());
        let err = provisioner.build_identity("", Codec::default()).await.unwrap_err();
        assert!(matches!(err, InitError::Session(_)));
        assert_eq!(service.calls(IdentityStage::Kbpki), 0);
    }
}
