use std::time::Duration;

pub const DEFAULT_ENV_TAG: &str = "env=default";

/// Tunables shared by every watcher of a service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchOptions {
    /// Tag appended to every resolved cluster and its endpoints
    pub env_tag: String,
    /// Pause after a failed health read before polling again
    pub retry_backoff: Duration,
}

impl WatchOptions {
    /// Options carrying `env=<env>` as the environment tag
    pub fn for_env(env: &str) -> Self {
        Self {
            env_tag: format!("env={}", env),
            ..Default::default()
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            env_tag: DEFAULT_ENV_TAG.to_string(),
            retry_backoff: Duration::from_secs(1),
        }
    }
}
