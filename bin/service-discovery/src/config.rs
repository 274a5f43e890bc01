//! Daemon configuration loaded from environment variables

use discovery_consul::ConsulConfig;
use discovery_core::{DiscoveryError, Result};
use discovery_watch::WatchOptions;
use std::net::SocketAddr;

pub struct Config {
    pub service: String,
    /// Comma separated datacenter list; empty watches the local datacenter
    pub datacenters: String,
    pub statuses: Vec<String>,
    pub watch: WatchOptions,
    pub listen_addr: SocketAddr,
    pub consul: ConsulConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let service = lookup("DISCOVERY_SERVICE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DiscoveryError::InvalidConfiguration("DISCOVERY_SERVICE must be set".to_string())
            })?;

        let datacenters = lookup("DISCOVERY_DATACENTERS").unwrap_or_default();

        let statuses: Vec<String> = lookup("DISCOVERY_STATUSES")
            .unwrap_or_else(|| "passing".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if statuses.is_empty() {
            return Err(DiscoveryError::InvalidConfiguration(
                "DISCOVERY_STATUSES must name at least one status".to_string(),
            ));
        }

        let env = lookup("DISCOVERY_ENV").unwrap_or_else(|| "default".to_string());

        let listen = lookup("DISCOVERY_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:9090".to_string());
        let listen_addr = listen.parse::<SocketAddr>().map_err(|_| {
            DiscoveryError::InvalidConfiguration(format!(
                "DISCOVERY_LISTEN_ADDR is not a socket address: {}",
                listen
            ))
        })?;

        let consul = ConsulConfig::from_lookup(&lookup)?;

        Ok(Self {
            service,
            datacenters,
            statuses,
            watch: WatchOptions::for_env(env.trim()),
            listen_addr,
            consul,
        })
    }
}
