use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use info_store::PersistenceConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Top-level service configuration, read from a TOML file.
///
/// Every field has a default, so a partial file (or none at all) is valid.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Async workers and blocking document workers, each.
    pub worker_threads: usize,
    /// Requests allowed in flight at once.
    pub max_connections: usize,
    pub max_body_size: usize,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    pub persistence: PersistenceConfig,
    pub pairing: PairingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 20334)),
            worker_threads: 30,
            max_connections: 256,
            max_body_size: 1024 * 1024,
            request_timeout_secs: 30,
            tls: None,
            persistence: PersistenceConfig::default(),
            pairing: PairingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.worker_threads == 0 {
            return Err(ServerError::Config("worker_threads must be at least 1".into()));
        }
        if self.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ServerError::Config("request_timeout_secs must be at least 1".into()));
        }
        if self.pairing.ttl_secs == Some(0) {
            return Err(ServerError::Config("pairing.ttl_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// TLS material. The chain, when given, is appended to the leaf certificate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_path: Option<PathBuf>,
}

/// Pairing entry housekeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Age after which unclaimed pairing requests are removed. `None`
    /// disables the sweep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            sweep_interval_secs: 300,
        }
    }
}
