//! Clusters of endpoints and change detection between cluster lists

use crate::Endpoint;
use serde::{Deserialize, Serialize};

/// All healthy instances backing one logical service name
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
    /// Cluster-level tags (the environment tag once the cluster has been enriched)
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Cluster {
    /// Create an empty cluster for a service name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Append the environment tag to the cluster and to every endpoint.
    ///
    /// Applying the same tag twice is a no-op.
    pub fn add_env_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
        for endpoint in &mut self.endpoints {
            if !endpoint.tags.iter().any(|t| t == tag) {
                endpoint.tags.push(tag.to_string());
            }
        }
    }

    /// Endpoints sorted by ID
    pub fn sorted_endpoints(&self) -> Vec<&Endpoint> {
        let mut endpoints: Vec<&Endpoint> = self.endpoints.iter().collect();
        endpoints.sort_by(|a, b| a.id.cmp(&b.id));
        endpoints
    }

    /// Compare endpoint sets, ignoring endpoint order
    pub fn same_endpoints(&self, other: &Cluster) -> bool {
        if self.endpoints.len() != other.endpoints.len() {
            return false;
        }
        self.sorted_endpoints()
            .iter()
            .zip(other.sorted_endpoints())
            .all(|(a, b)| a.matches(b))
    }
}

/// Report whether `new` differs from `last`.
///
/// Both lists are ordered by cluster name before the positional comparison, and each
/// pair is compared on its endpoint set only.
pub fn clusters_changed(new: &[Cluster], last: &[Cluster]) -> bool {
    if new.len() != last.len() {
        return true;
    }

    sorted_by_name(new)
        .into_iter()
        .zip(sorted_by_name(last))
        .any(|(a, b)| !a.same_endpoints(b))
}

fn sorted_by_name(clusters: &[Cluster]) -> Vec<&Cluster> {
    let mut sorted: Vec<&Cluster> = clusters.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}
