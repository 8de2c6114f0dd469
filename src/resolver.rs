use crate::error::RelayError;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::timeout;

/// Looks up the addresses a hostname currently points at.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Addresses in resolver order; only the first one is ever compared.
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, RelayError>;
}

/// System resolver (getaddrinfo via tokio) bounded by a timeout.
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, RelayError> {
        if hostname.trim().is_empty() {
            return Err(RelayError::Credentials("credential has no hostname".to_string()));
        }

        let addrs = timeout(self.timeout, tokio::net::lookup_host((hostname, 0)))
            .await
            .map_err(|_| RelayError::Transport(format!("DNS lookup for {} timed out", hostname)))?
            .map_err(RelayError::Io)?;

        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}
