//! Endpoint model
use serde::{Deserialize, Serialize};

/// One reachable service instance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub address: String,
    pub port: u16,
    /// Sorted instance tags plus `dc=<datacenter>`; the environment tag is appended last
    pub tags: Vec<String>,
}

impl Endpoint {
    /// Field-by-field comparison. Tag order is significant.
    pub fn matches(&self, other: &Endpoint) -> bool {
        self.id == other.id
            && self.address == other.address
            && self.port == other.port
            && self.tags == other.tags
    }
}
