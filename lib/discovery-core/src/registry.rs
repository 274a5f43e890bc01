//! Cluster registry holding the latest discovered view per service

use crate::{Cluster, DiscoveryError, Endpoint, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// ClusterRegistry keeps the most recent cluster received for each service
#[derive(Clone)]
pub struct ClusterRegistry {
    // Map of service name to its latest cluster
    clusters: Arc<RwLock<HashMap<String, Cluster>>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self {
            clusters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace the stored cluster for `cluster.name`
    pub async fn update_cluster(&self, cluster: Cluster) {
        let mut clusters = self.clusters.write().await;
        debug!(
            "Updated cluster {} with {} endpoints",
            cluster.name,
            cluster.endpoints.len()
        );
        clusters.insert(cluster.name.clone(), cluster);
    }

    /// Get a cluster by service name
    pub async fn get_cluster(&self, name: &str) -> Result<Cluster> {
        let clusters = self.clusters.read().await;
        clusters
            .get(name)
            .cloned()
            .ok_or_else(|| DiscoveryError::ServiceNotFound(name.to_string()))
    }

    /// Get the endpoints of a service
    pub async fn get_endpoints(&self, name: &str) -> Result<Vec<Endpoint>> {
        let cluster = self.get_cluster(name).await?;
        Ok(cluster.endpoints)
    }

    /// List all clusters, ordered by name
    pub async fn list_clusters(&self) -> Vec<Cluster> {
        let clusters = self.clusters.read().await;
        let mut list: Vec<Cluster> = clusters.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Remove a cluster
    pub async fn remove_cluster(&self, name: &str) -> Option<Cluster> {
        let mut clusters = self.clusters.write().await;
        let removed = clusters.remove(name);
        debug!("Removed cluster: {}", name);
        removed
    }

    pub async fn cluster_count(&self) -> usize {
        let clusters = self.clusters.read().await;
        clusters.len()
    }
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
