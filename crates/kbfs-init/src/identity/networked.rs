//! Identity backed by the local identity daemon

use async_trait::async_trait;
use kbfs_core::{
    Codec, CryptoOps, IdentityService, IdentityVerifier, ServerError, ServerResult,
};
use kbfs_servers::{CryptoClient, KbpkiClient, ReliabilityConfig};
use parking_lot::Mutex;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Environment variable overriding the identity daemon address
pub const ENV_SERVICE_ADDR: &str = "KEYBASE_SERVICE_ADDR";

/// Address used when [`ENV_SERVICE_ADDR`] is unset
pub const DEFAULT_SERVICE_ADDR: &str = "127.0.0.1:40933";

/// Clients of the identity daemon over the framed RPC transport
#[derive(Debug)]
pub struct DaemonIdentityService {
    reliability: ReliabilityConfig,
    session: Mutex<Option<SocketAddr>>,
}

impl DaemonIdentityService {
    /// Create an unconfigured service
    pub fn new(reliability: ReliabilityConfig) -> Self {
        Self {
            reliability,
            session: Mutex::new(None),
        }
    }

    fn daemon_addr(&self) -> ServerResult<String> {
        match *self.session.lock() {
            Some(addr) => Ok(addr.to_string()),
            None => Err(ServerError::Misconfigured(
                "identity session was not configured".into(),
            )),
        }
    }
}

impl Default for DaemonIdentityService {
    fn default() -> Self {
        Self::new(ReliabilityConfig::default())
    }
}

/// Parse a daemon address, treating an empty value as the default
pub fn parse_service_addr(raw: Option<&str>) -> ServerResult<SocketAddr> {
    let raw = match raw {
        Some(value) if !value.is_empty() => value,
        _ => DEFAULT_SERVICE_ADDR,
    };
    raw.parse().map_err(|e| {
        ServerError::Misconfigured(format!("{ENV_SERVICE_ADDR}={raw} is not a socket address: {e}"))
    })
}

#[async_trait]
impl IdentityService for DaemonIdentityService {
    async fn configure_session(&self) -> ServerResult<()> {
        let addr = parse_service_addr(env::var(ENV_SERVICE_ADDR).ok().as_deref())?;
        debug!(%addr, "configured identity daemon session");
        *self.session.lock() = Some(addr);
        Ok(())
    }

    async fn kbpki(&self) -> ServerResult<Arc<dyn IdentityVerifier>> {
        let addr = self.daemon_addr()?;
        let client = KbpkiClient::connect(Codec::default(), &addr, self.reliability).await?;
        Ok(Arc::new(client))
    }

    async fn crypto(&self, codec: Codec) -> ServerResult<Arc<dyn CryptoOps>> {
        let addr = self.daemon_addr()?;
        let client = CryptoClient::connect(codec, &addr, self.reliability).await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_addr_defaults_and_rejects_garbage() {
        assert_eq!(
            parse_service_addr(None).unwrap(),
            DEFAULT_SERVICE_ADDR.parse::<SocketAddr>().unwrap()
        );
        assert_eq!(parse_service_addr(Some("")).unwrap().port(), 40933);
        assert_eq!(parse_service_addr(Some("10.0.0.2:7000")).unwrap().port(), 7000);
        assert!(matches!(
            parse_service_addr(Some("not an address")),
            Err(ServerError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_clients_require_session() {
        let service = DaemonIdentityService::default();
        assert!(matches!(
            service.kbpki().await.err().unwrap(),
            ServerError::Misconfigured(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_fails_client_construction() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let service = DaemonIdentityService::new(ReliabilityConfig {
            request_timeout_ms: 500,
            ..ReliabilityConfig::default()
        });
        *service.session.lock() = Some(addr);

        assert!(service.kbpki().await.is_err());
        assert!(service.crypto(Codec::default()).await.is_err());
    }
}
