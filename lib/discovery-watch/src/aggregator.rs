//! Merge per-datacenter watches into one cluster stream

use crate::metrics::AGGREGATE_LABEL;
use crate::{DomainEvent, DomainFanIn, DomainWatcher, WatchMetrics, WatchOptions, CHANNEL_CAPACITY};
use discovery_core::{clusters_changed, Cluster, RegistryClient};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Split a comma separated datacenter list. An empty list watches the local datacenter.
pub fn parse_datacenters(list: &str) -> Vec<String> {
    list.trim().split(',').map(|dc| dc.trim().to_string()).collect()
}

/// Merge state owned by the aggregator task
#[derive(Debug)]
pub struct AggregateSession {
    service: String,
    env_tag: String,
    // Last clusters received per datacenter index
    slots: Vec<Vec<Cluster>>,
    last_emitted: Option<Vec<Cluster>>,
}

impl AggregateSession {
    pub fn new(service: impl Into<String>, env_tag: impl Into<String>, datacenters: usize) -> Self {
        Self {
            service: service.into(),
            env_tag: env_tag.into(),
            slots: vec![Vec::new(); datacenters],
            last_emitted: None,
        }
    }

    /// A single cluster named after the service holding every stored endpoint, in
    /// datacenter order
    pub fn merged(&self) -> Vec<Cluster> {
        let mut cluster = Cluster::new(self.service.clone());
        for slot in &self.slots {
            for domain_cluster in slot {
                cluster.endpoints.extend(domain_cluster.endpoints.iter().cloned());
            }
        }
        cluster.add_env_tag(&self.env_tag);
        vec![cluster]
    }

    /// Store a datacenter's clusters and return the merged view if it changed
    pub fn observe(&mut self, index: usize, clusters: Vec<Cluster>) -> Option<Vec<Cluster>> {
        let slot = self.slots.get_mut(index)?;
        *slot = clusters;

        let merged = self.merged();
        let changed = match &self.last_emitted {
            Some(last) => clusters_changed(&merged, last),
            None => true,
        };
        self.last_emitted = Some(merged);
        if changed {
            self.last_emitted.clone()
        } else {
            None
        }
    }

    /// Consume `fan_in` until cancelled, sending every merged change on `tx`
    pub async fn run(
        mut self,
        mut fan_in: DomainFanIn,
        tx: mpsc::Sender<Vec<Cluster>>,
        cancel: CancellationToken,
        metrics: Option<WatchMetrics>,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = fan_in.next() => event,
            };

            let (index, clusters) = match event {
                Some(DomainEvent::Update { index, clusters }) => (index, clusters),
                Some(DomainEvent::Closed { index }) => {
                    warn!(
                        service = %self.service,
                        "Datacenter watch #{} closed, {} still active",
                        index,
                        fan_in.active()
                    );
                    continue;
                }
                None => {
                    warn!(service = %self.service, "All datacenter watches stopped");
                    cancel.cancelled().await;
                    break;
                }
            };

            let Some(merged) = self.observe(index, clusters) else {
                debug!(
                    service = %self.service,
                    "Datacenter #{} health changed but server list not changed",
                    index
                );
                continue;
            };

            let endpoints: usize = merged.iter().map(|c| c.endpoints.len()).sum();
            info!(service = %self.service, "Publishing merged cluster with {} endpoints", endpoints);
            if let Some(metrics) = &metrics {
                metrics.record_emission(AGGREGATE_LABEL);
                metrics.set_endpoints(&self.service, endpoints);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(merged) => {
                    if sent.is_err() {
                        debug!(service = %self.service, "Merged receiver dropped, stopping aggregation");
                        break;
                    }
                }
            }
        }
    }
}

/// ServiceWatch follows one service across several datacenters
pub struct ServiceWatch<C: ?Sized> {
    client: Arc<C>,
    service: String,
    statuses: Vec<String>,
    datacenters: Vec<String>,
    options: WatchOptions,
    metrics: Option<WatchMetrics>,
}

impl<C> ServiceWatch<C>
where
    C: RegistryClient + ?Sized + 'static,
{
    /// Watch `service` in each datacenter of the comma separated `datacenters` list,
    /// accepting `passing` checks only
    pub fn new(client: Arc<C>, service: impl Into<String>, datacenters: &str) -> Self {
        Self {
            client,
            service: service.into(),
            statuses: vec!["passing".to_string()],
            datacenters: parse_datacenters(datacenters),
            options: WatchOptions::default(),
            metrics: None,
        }
    }

    /// Health statuses that count as healthy
    pub fn with_statuses(mut self, statuses: Vec<String>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: WatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn datacenters(&self) -> &[String] {
        &self.datacenters
    }

    /// Run on a new task and return the receiving end of the merged stream
    pub fn spawn(self, cancel: CancellationToken) -> mpsc::Receiver<Vec<Cluster>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(self.run(tx, cancel));
        rx
    }

    /// Start one watcher per datacenter and merge their output until cancelled
    pub async fn run(self, tx: mpsc::Sender<Vec<Cluster>>, cancel: CancellationToken) {
        info!(
            service = %self.service,
            "Watching {} datacenters: {:?}",
            self.datacenters.len(),
            self.datacenters
        );

        // Watchers stop with the merge loop, whether it was cancelled or lost its receiver
        let watchers = cancel.child_token();
        let mut fan_in = DomainFanIn::new();
        for dc in &self.datacenters {
            let mut watcher = DomainWatcher::new(
                self.client.clone(),
                self.service.clone(),
                self.statuses.clone(),
                dc.clone(),
            )
            .with_options(self.options.clone());
            if let Some(metrics) = &self.metrics {
                watcher = watcher.with_metrics(metrics.clone());
            }
            fan_in.push(watcher.spawn(watchers.child_token()));
        }

        let session = AggregateSession::new(
            self.service.clone(),
            self.options.env_tag.clone(),
            self.datacenters.len(),
        );
        let _watchers = watchers.drop_guard();
        session.run(fan_in, tx, cancel, self.metrics).await;
    }
}
