//! Registry client abstraction consumed by watchers

use crate::health::null_as_default;
use crate::{HealthCheck, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options for a registry read
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Datacenter to scope the read to; `None` means the agent's own
    pub datacenter: Option<String>,
    /// Ask the registry for a consistent read
    pub require_consistent: bool,
    /// Block until the registry index moves past this value (0 returns immediately)
    pub wait_index: u64,
}

impl QueryOptions {
    /// Consistent read scoped to `datacenter`; an empty name selects the local datacenter
    pub fn consistent(datacenter: &str) -> Self {
        let datacenter = datacenter.trim();
        Self {
            datacenter: (!datacenter.is_empty()).then(|| datacenter.to_string()),
            require_consistent: true,
            wait_index: 0,
        }
    }

    /// Set the blocking index
    pub fn with_wait_index(mut self, index: u64) -> Self {
        self.wait_index = index;
        self
    }
}

/// Metadata returned alongside a blocking read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryMeta {
    pub last_index: u64,
}

/// Node a service instance runs on
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthNode {
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
}

/// Service definition as reported by the health endpoint
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthService {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
}

/// One service instance together with all of its health checks
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    #[serde(default)]
    pub node: HealthNode,
    #[serde(default)]
    pub service: HealthService,
    #[serde(default, deserialize_with = "null_as_default")]
    pub checks: Vec<HealthCheck>,
}

/// Catalog registration of one service instance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogService {
    #[serde(default)]
    pub node: String,
    /// Node address
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    /// Service-level address; may be empty
    #[serde(default)]
    pub service_address: String,
    #[serde(default)]
    pub service_port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_tags: Vec<String>,
}

/// Read access to a health-checking service registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Blocking read of every instance of `service` with its health checks
    async fn health_service(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<(Vec<ServiceEntry>, QueryMeta)>;

    /// Catalog registrations of `service`
    async fn catalog_service(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<Vec<CatalogService>>;
}
