//! Prometheus metrics for discovery watches

use anyhow::Result;
use prometheus::{CounterVec, Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Label used for the merged cross-datacenter stream
pub const AGGREGATE_LABEL: &str = "all";

/// Prometheus metrics collector for watchers and the aggregator.
///
/// Clones share the same registry and metrics.
#[derive(Clone)]
pub struct WatchMetrics {
    /// Successful health reads
    pub fetches_total: CounterVec,
    /// Failed health reads
    pub fetch_errors_total: CounterVec,
    /// Failed catalog lookups
    pub catalog_errors_total: CounterVec,
    /// Cluster lists published downstream
    pub emissions_total: CounterVec,
    /// Cursor of the last successful health read
    pub last_index: IntGaugeVec,
    /// Endpoints in the last published cluster
    pub endpoints: IntGaugeVec,
    pub registry: Arc<Registry>,
}

impl WatchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let fetches_total = CounterVec::new(
            Opts::new("discovery_fetches_total", "Successful registry health reads"),
            &["datacenter"],
        )?;

        let fetch_errors_total = CounterVec::new(
            Opts::new("discovery_fetch_errors_total", "Failed registry health reads"),
            &["datacenter"],
        )?;

        let catalog_errors_total = CounterVec::new(
            Opts::new("discovery_catalog_errors_total", "Failed catalog lookups"),
            &["datacenter"],
        )?;

        let emissions_total = CounterVec::new(
            Opts::new("discovery_emissions_total", "Cluster updates published"),
            &["datacenter"],
        )?;

        let last_index = IntGaugeVec::new(
            Opts::new("discovery_last_index", "Registry index of the last successful read"),
            &["datacenter"],
        )?;

        let endpoints = IntGaugeVec::new(
            Opts::new("discovery_endpoints", "Endpoints in the last published cluster"),
            &["service"],
        )?;

        registry.register(Box::new(fetches_total.clone()))?;
        registry.register(Box::new(fetch_errors_total.clone()))?;
        registry.register(Box::new(catalog_errors_total.clone()))?;
        registry.register(Box::new(emissions_total.clone()))?;
        registry.register(Box::new(last_index.clone()))?;
        registry.register(Box::new(endpoints.clone()))?;

        Ok(Self {
            fetches_total,
            fetch_errors_total,
            catalog_errors_total,
            emissions_total,
            last_index,
            endpoints,
            registry,
        })
    }

    pub fn record_fetch(&self, datacenter: &str, index: u64) {
        let dc = label(datacenter);
        self.fetches_total.with_label_values(&[dc]).inc();
        self.last_index
            .with_label_values(&[dc])
            .set(i64::try_from(index).unwrap_or(i64::MAX));
    }

    pub fn record_fetch_error(&self, datacenter: &str) {
        self.fetch_errors_total.with_label_values(&[label(datacenter)]).inc();
    }

    pub fn record_catalog_error(&self, datacenter: &str) {
        self.catalog_errors_total.with_label_values(&[label(datacenter)]).inc();
    }

    pub fn record_emission(&self, datacenter: &str) {
        self.emissions_total.with_label_values(&[label(datacenter)]).inc();
    }

    pub fn set_endpoints(&self, service: &str, count: usize) {
        self.endpoints
            .with_label_values(&[service])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// The agent's own datacenter is watched under an empty name
fn label(datacenter: &str) -> &str {
    if datacenter.is_empty() {
        "local"
    } else {
        datacenter
    }
}
