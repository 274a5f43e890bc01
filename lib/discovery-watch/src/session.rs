//! Per-datacenter watch state

use discovery_core::{checks_equal, clusters_changed, Cluster, HealthCheck};

/// Position of the last successful blocking read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchCursor {
    last_index: u64,
}

impl WatchCursor {
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    /// Move to `index`. Returns false, leaving the cursor alone, if `index` is behind it.
    pub fn advance(&mut self, index: u64) -> bool {
        if index < self.last_index {
            return false;
        }
        self.last_index = index;
        true
    }
}

/// State owned by one datacenter watcher across poll cycles
#[derive(Debug, Default)]
pub struct WatchSession {
    cursor: WatchCursor,
    last_passing: Vec<HealthCheck>,
    last_clusters: Vec<Cluster>,
}

impl WatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> WatchCursor {
        self.cursor
    }

    /// Record the index returned by a successful read
    pub fn advance(&mut self, index: u64) -> bool {
        self.cursor.advance(index)
    }

    /// Whether `passing` differs from the passing set of the last resolved cycle
    pub fn passing_changed(&self, passing: &[HealthCheck]) -> bool {
        !checks_equal(&self.last_passing, passing)
    }

    /// Persist the cycle's passing set and clusters.
    ///
    /// Returns the clusters when they differ from the previous cycle's.
    pub fn commit(&mut self, passing: Vec<HealthCheck>, clusters: Vec<Cluster>) -> Option<Vec<Cluster>> {
        let changed = clusters_changed(&clusters, &self.last_clusters);
        self.last_passing = passing;
        self.last_clusters = clusters;
        changed.then(|| self.last_clusters.clone())
    }

    pub fn last_clusters(&self) -> &[Cluster] {
        &self.last_clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discovery_core::Endpoint;

    fn check(id: &str) -> HealthCheck {
        HealthCheck {
            node: "node-1".to_string(),
            check_id: format!("service:{}", id),
            status: "passing".to_string(),
            service_id: id.to_string(),
            service_name: "orders".to_string(),
            ..Default::default()
        }
    }

    fn cluster(ids: &[&str]) -> Cluster {
        Cluster {
            name: "orders".to_string(),
            endpoints: ids
                .iter()
                .map(|id| Endpoint {
                    id: id.to_string(),
                    address: "10.0.0.1".to_string(),
                    port: 8080,
                    tags: vec!["dc=us".to_string()],
                })
                .collect(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let mut cursor = WatchCursor::default();
        assert!(cursor.advance(5));
        assert!(cursor.advance(5));
        assert!(cursor.advance(9));
        assert!(!cursor.advance(3));
        assert_eq!(cursor.last_index(), 9);
    }

    #[test]
    fn test_empty_passing_set_matches_fresh_session() {
        let session = WatchSession::new();
        assert!(!session.passing_changed(&[]));
        assert!(session.passing_changed(&[check("i1")]));
    }

    #[test]
    fn test_commit_reports_changes_only() {
        let mut session = WatchSession::new();

        let first = session.commit(vec![check("i1")], vec![cluster(&["i1"])]);
        assert_eq!(first.map(|c| c.len()), Some(1));
        assert!(!session.passing_changed(&[check("i1")]));

        // Different passing set resolving to the same endpoints
        let mut extra = check("i1");
        extra.check_id = "http:i1".to_string();
        assert!(session.passing_changed(&[check("i1"), extra.clone()]));
        assert!(session
            .commit(vec![check("i1"), extra], vec![cluster(&["i1"])])
            .is_none());

        let removed = session.commit(vec![], vec![]);
        assert_eq!(removed.map(|c| c.len()), Some(0));
        assert!(session.last_clusters().is_empty());
    }
}
