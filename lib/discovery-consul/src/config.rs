//! Consul connection settings

use discovery_core::{DiscoveryError, Result};
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8500";

/// Connection settings for a Consul agent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsulConfig {
    /// Agent base URL
    pub address: String,
    /// ACL token sent as `X-Consul-Token`
    pub token: Option<String>,
    /// Server-side wait for blocking reads
    pub wait_time: Duration,
    /// Timeout for non-blocking requests, and slack added on top of `wait_time`
    pub request_timeout: Duration,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            token: None,
            wait_time: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ConsulConfig {
    /// Load settings from `CONSUL_HTTP_ADDR`, `CONSUL_HTTP_TOKEN` and `CONSUL_WAIT_TIME_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(address) = lookup("CONSUL_HTTP_ADDR").filter(|a| !a.trim().is_empty()) {
            config.address = normalize_address(&address);
        }

        config.token = lookup("CONSUL_HTTP_TOKEN").filter(|t| !t.is_empty());

        if let Some(wait) = lookup("CONSUL_WAIT_TIME_SECS") {
            let secs = wait.trim().parse::<u64>().map_err(|_| {
                DiscoveryError::InvalidConfiguration(format!(
                    "CONSUL_WAIT_TIME_SECS must be a number of seconds, got {:?}",
                    wait
                ))
            })?;
            if secs == 0 {
                return Err(DiscoveryError::InvalidConfiguration(
                    "CONSUL_WAIT_TIME_SECS must be > 0".to_string(),
                ));
            }
            config.wait_time = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// HTTP timeout for a blocking read. Consul adds up to `wait/16` of jitter.
    pub fn blocking_timeout(&self) -> Duration {
        self.wait_time + self.wait_time / 16 + self.request_timeout
    }
}

fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
