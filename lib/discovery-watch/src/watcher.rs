//! Long-poll watcher for one service in one datacenter

use crate::{WatchMetrics, WatchOptions, WatchSession, CHANNEL_CAPACITY};
use discovery_core::{
    passing_checks, CatalogService, Cluster, Endpoint, HealthCheck, QueryOptions, RegistryClient,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// DomainWatcher keeps the healthy endpoints of a service in one datacenter up to date
pub struct DomainWatcher<C: ?Sized> {
    client: Arc<C>,
    service: String,
    statuses: Vec<String>,
    datacenter: String,
    options: WatchOptions,
    metrics: Option<WatchMetrics>,
}

impl<C> DomainWatcher<C>
where
    C: RegistryClient + ?Sized + 'static,
{
    /// Create a watcher. An empty `datacenter` watches the agent's own datacenter.
    pub fn new(
        client: Arc<C>,
        service: impl Into<String>,
        statuses: Vec<String>,
        datacenter: impl Into<String>,
    ) -> Self {
        Self {
            client,
            service: service.into(),
            statuses,
            datacenter: datacenter.into(),
            options: WatchOptions::default(),
            metrics: None,
        }
    }

    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn datacenter(&self) -> &str {
        &self.datacenter
    }

    /// Run the watch on a new task and return the receiving end of its cluster stream
    pub fn spawn(self, cancel: CancellationToken) -> mpsc::Receiver<Vec<Cluster>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(self.run(tx, cancel));
        rx
    }

    /// Poll until cancelled, sending every effective change of the cluster list on `tx`.
    ///
    /// Registry failures are retried forever. The loop also stops if `tx` is closed.
    pub async fn run(self, tx: mpsc::Sender<Vec<Cluster>>, cancel: CancellationToken) {
        let mut session = WatchSession::new();
        let service = self.service.as_str();
        let dc = self.datacenter.as_str();

        loop {
            let query = QueryOptions::consistent(dc).with_wait_index(session.cursor().last_index());
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.client.health_service(service, &query) => result,
            };

            let (entries, meta) = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(service, datacenter = dc, error = %e, "Error fetching health state");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_fetch_error(dc);
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.options.retry_backoff) => continue,
                    }
                }
            };

            if !session.advance(meta.last_index) {
                warn!(
                    service,
                    datacenter = dc,
                    "Registry index went backwards ({} < {}), keeping cursor",
                    meta.last_index,
                    session.cursor().last_index()
                );
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_fetch(dc, session.cursor().last_index());
            }

            let checks = entries.iter().flat_map(|entry| entry.checks.iter());
            let passing = passing_checks(checks, &self.statuses);
            debug!(service, datacenter = dc, "Health changed to #{}", meta.last_index);

            if !session.passing_changed(&passing) {
                debug!(
                    service,
                    datacenter = dc,
                    "Health changed to #{}, but passing list not changed",
                    meta.last_index
                );
                continue;
            }

            let clusters = tokio::select! {
                _ = cancel.cancelled() => break,
                clusters = self.resolve_clusters(&passing) => clusters,
            };

            let Some(clusters) = session.commit(passing, clusters) else {
                debug!(
                    service,
                    datacenter = dc,
                    "Health changed to #{}, but server list not changed",
                    meta.last_index
                );
                continue;
            };

            info!(
                service,
                datacenter = dc,
                "Publishing {} clusters at #{}",
                clusters.len(),
                meta.last_index
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_emission(dc);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(clusters) => {
                    if sent.is_err() {
                        debug!(service, datacenter = dc, "Cluster receiver dropped, stopping watch");
                        break;
                    }
                }
            }
        }

        debug!(service, datacenter = dc, "Watch stopped");
    }

    /// Build one cluster per service name present in the passing set, ordered by name
    async fn resolve_clusters(&self, passing: &[HealthCheck]) -> Vec<Cluster> {
        let mut by_service: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for check in passing {
            // Node-level checks carry no service
            if check.service_name.is_empty() {
                continue;
            }
            by_service
                .entry(check.service_name.as_str())
                .or_default()
                .insert(check.service_id.as_str());
        }

        let mut clusters = Vec::with_capacity(by_service.len());
        for (name, ids) in by_service {
            clusters.push(self.resolve_cluster(name, &ids).await);
        }
        clusters
    }

    /// Resolve catalog entries for the passing instances of one service.
    ///
    /// A failed lookup yields an empty cluster without the environment tag.
    async fn resolve_cluster(&self, name: &str, passing: &HashSet<&str>) -> Cluster {
        let mut cluster = Cluster::new(name);
        let query = QueryOptions::consistent(&self.datacenter);
        let services = match self.client.catalog_service(name, &query).await {
            Ok(services) => services,
            Err(e) => {
                warn!(
                    service = name,
                    datacenter = %self.datacenter,
                    error = %e,
                    "Error getting catalog service"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_catalog_error(&self.datacenter);
                }
                return cluster;
            }
        };

        cluster.endpoints = passing_endpoints(&services, passing, &self.datacenter);
        cluster.add_env_tag(&self.options.env_tag);
        cluster
    }
}

/// Turn catalog entries whose service ID passed its checks into endpoints
pub(crate) fn passing_endpoints(
    services: &[CatalogService],
    passing: &HashSet<&str>,
    datacenter: &str,
) -> Vec<Endpoint> {
    services
        .iter()
        .filter(|svc| passing.contains(svc.service_id.as_str()))
        .map(|svc| {
            let dc = if svc.datacenter.is_empty() {
                datacenter
            } else {
                svc.datacenter.as_str()
            };

            let mut tags = svc.service_tags.clone();
            tags.push(format!("dc={}", dc));
            tags.sort();

            let address = if svc.service_address.is_empty() {
                svc.address.clone()
            } else {
                svc.service_address.clone()
            };

            Endpoint {
                id: svc.service_id.clone(),
                address,
                port: svc.service_port,
                tags,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog_entry, entry, passing_check, MockRegistry};
    use std::time::Duration;

    fn options() -> WatchOptions {
        WatchOptions {
            env_tag: "env=test".to_string(),
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn watcher(registry: &Arc<MockRegistry>, dc: &str) -> DomainWatcher<MockRegistry> {
        DomainWatcher::new(registry.clone(), "orders", vec!["passing".to_string()], dc)
            .with_options(options())
    }

    async fn recv(rx: &mut mpsc::Receiver<Vec<Cluster>>) -> Vec<Cluster> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timed out waiting for clusters")
            .expect("Cluster channel closed")
    }

    #[test]
    fn test_passing_endpoints() {
        let mut with_service_addr = catalog_entry("us", "i1", "orders", "10.0.0.1", 8080);
        with_service_addr.service_address = "172.16.0.1".to_string();
        with_service_addr.service_tags = vec!["zone=b".to_string(), "api".to_string()];

        let mut no_dc = catalog_entry("", "i2", "orders", "10.0.0.2", 8081);
        no_dc.service_tags = vec!["primary".to_string()];

        let failing = catalog_entry("us", "i3", "orders", "10.0.0.3", 8082);

        let passing: HashSet<&str> = ["i1", "i2"].into_iter().collect();
        let endpoints = passing_endpoints(&[with_service_addr, no_dc, failing], &passing, "us");

        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].id, "i1");
        assert_eq!(endpoints[0].address, "172.16.0.1");
        assert_eq!(endpoints[0].tags, vec!["api", "dc=us", "zone=b"]);
        assert_eq!(endpoints[1].id, "i2");
        assert_eq!(endpoints[1].address, "10.0.0.2");
        assert_eq!(endpoints[1].port, 8081);
        assert_eq!(endpoints[1].tags, vec!["dc=us", "primary"]);
    }

    #[tokio::test]
    async fn test_cursor_advances_on_every_fetch() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_catalog("us", "orders", vec![catalog_entry("us", "i1", "orders", "10.0.0.1", 8080)]);
        for index in [3, 5, 8] {
            registry.push_health("us", vec![entry(vec![passing_check("i1", "orders")])], index);
        }

        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "us").spawn(cancel.clone());

        let clusters = recv(&mut rx).await;
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].endpoints[0].tags, vec!["dc=us", "env=test"]);

        registry.wait_for_polls("us", 4).await;
        assert_eq!(registry.wait_indexes("us"), vec![0, 3, 5, 8]);
        assert_eq!(registry.catalog_calls(), 1);
        assert!(rx.try_recv().is_err());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_backwards_index_keeps_cursor() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_catalog("us", "orders", vec![catalog_entry("us", "i1", "orders", "10.0.0.1", 8080)]);
        registry.push_health("us", vec![entry(vec![passing_check("i1", "orders")])], 10);
        // Index reset on the server side
        registry.push_health("us", vec![entry(vec![passing_check("i1", "orders")])], 4);

        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "us").spawn(cancel.clone());

        assert_eq!(recv(&mut rx).await[0].endpoints[0].id, "i1");

        registry.wait_for_polls("us", 3).await;
        assert_eq!(registry.wait_indexes("us"), vec![0, 10, 10]);
        assert_eq!(registry.catalog_calls(), 1);
        assert!(rx.try_recv().is_err());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_reordered_checks_skip_catalog() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_catalog(
            "us",
            "orders",
            vec![
                catalog_entry("us", "i1", "orders", "10.0.0.1", 8080),
                catalog_entry("us", "i2", "orders", "10.0.0.2", 8080),
            ],
        );
        let mut output_churn = passing_check("i1", "orders");
        output_churn.output = "changed".to_string();

        registry.push_health(
            "us",
            vec![
                entry(vec![passing_check("i1", "orders")]),
                entry(vec![passing_check("i2", "orders")]),
            ],
            10,
        );
        registry.push_health(
            "us",
            vec![
                entry(vec![passing_check("i2", "orders")]),
                entry(vec![output_churn]),
            ],
            11,
        );

        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "us").spawn(cancel.clone());

        assert_eq!(recv(&mut rx).await[0].endpoints.len(), 2);
        registry.wait_for_polls("us", 3).await;
        assert_eq!(registry.catalog_calls(), 1);
        assert!(rx.try_recv().is_err());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_fetch_error_retries_without_advancing() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_catalog("eu", "orders", vec![catalog_entry("eu", "i1", "orders", "10.0.0.1", 8080)]);
        registry.push_health_error("eu");
        registry.push_health("eu", vec![entry(vec![passing_check("i1", "orders")])], 4);

        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "eu").spawn(cancel.clone());

        assert_eq!(recv(&mut rx).await.len(), 1);
        registry.wait_for_polls("eu", 3).await;
        assert_eq!(registry.wait_indexes("eu"), vec![0, 0, 4]);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_catalog_failure_is_isolated() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_catalog("us", "orders", vec![catalog_entry("us", "i1", "orders", "10.0.0.1", 8080)]);
        registry.push_health(
            "us",
            vec![
                entry(vec![passing_check("i1", "orders")]),
                entry(vec![passing_check("b1", "billing")]),
            ],
            7,
        );

        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "us").spawn(cancel.clone());

        let clusters = recv(&mut rx).await;
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].name, "billing");
        assert!(clusters[0].endpoints.is_empty());
        assert!(clusters[0].tags.is_empty());
        assert_eq!(clusters[1].name, "orders");
        assert_eq!(clusters[1].endpoints[0].id, "i1");
        assert_eq!(clusters[1].tags, vec!["env=test"]);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unmatched_catalog_still_gets_env_tag() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_catalog("us", "orders", vec![catalog_entry("us", "i9", "orders", "10.0.0.9", 8080)]);
        registry.push_health("us", vec![entry(vec![passing_check("i1", "orders")])], 2);

        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "us").spawn(cancel.clone());

        let clusters = recv(&mut rx).await;
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].endpoints.is_empty());
        assert_eq!(clusters[0].tags, vec!["env=test"]);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unchanged_endpoints_are_not_republished() {
        let registry = Arc::new(MockRegistry::new());
        registry.set_catalog(
            "us",
            "orders",
            vec![
                catalog_entry("us", "i1", "orders", "10.0.0.1", 8080),
                catalog_entry("us", "i2", "orders", "10.0.0.2", 8080),
            ],
        );

        let mut second_check = passing_check("i1", "orders");
        second_check.check_id = "http:i1".to_string();
        let mut failing = passing_check("i2", "orders");
        failing.status = "critical".to_string();

        registry.push_health(
            "us",
            vec![
                entry(vec![passing_check("i1", "orders")]),
                entry(vec![passing_check("i2", "orders")]),
            ],
            1,
        );
        // Extra passing check, same instances
        registry.push_health(
            "us",
            vec![
                entry(vec![passing_check("i1", "orders"), second_check.clone()]),
                entry(vec![passing_check("i2", "orders")]),
            ],
            2,
        );
        // i2 goes critical
        registry.push_health(
            "us",
            vec![
                entry(vec![passing_check("i1", "orders"), second_check]),
                entry(vec![failing]),
            ],
            3,
        );

        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "us").spawn(cancel.clone());

        assert_eq!(recv(&mut rx).await[0].endpoints.len(), 2);
        let clusters = recv(&mut rx).await;
        assert_eq!(clusters[0].endpoints.len(), 1);
        assert_eq!(clusters[0].endpoints[0].id, "i1");

        registry.wait_for_polls("us", 4).await;
        assert_eq!(registry.catalog_calls(), 3);
        assert!(rx.try_recv().is_err());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancel_closes_stream() {
        let registry = Arc::new(MockRegistry::new());
        let cancel = CancellationToken::new();
        let mut rx = watcher(&registry, "us").spawn(cancel.clone());

        registry.wait_for_polls("us", 1).await;
        cancel.cancel();

        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timed out waiting for watcher to stop");
        assert!(closed.is_none());
    }
}
