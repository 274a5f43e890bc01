//! Scripted in-memory registry for watcher tests

use async_trait::async_trait;
use discovery_core::{
    CatalogService, DiscoveryError, HealthCheck, QueryMeta, QueryOptions, RegistryClient, Result,
    ServiceEntry,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

type HealthResponse = Result<(Vec<ServiceEntry>, u64)>;

/// Registry whose health reads pop scripted responses per datacenter.
///
/// With nothing queued a health read blocks like a long-poll until a response is pushed.
/// Catalog reads for an unknown (datacenter, service) pair fail.
#[derive(Default)]
pub(crate) struct MockRegistry {
    health: Mutex<HashMap<String, VecDeque<HealthResponse>>>,
    catalog: Mutex<HashMap<(String, String), Vec<CatalogService>>>,
    wait_indexes: Mutex<HashMap<String, Vec<u64>>>,
    catalog_calls: AtomicUsize,
    pushed: Notify,
}

impl MockRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_health(&self, dc: &str, entries: Vec<ServiceEntry>, index: u64) {
        self.push(dc, Ok((entries, index)));
    }

    pub(crate) fn push_health_error(&self, dc: &str) {
        self.push(dc, Err(DiscoveryError::Transport("connection refused".to_string())));
    }

    fn push(&self, dc: &str, response: HealthResponse) {
        self.health
            .lock()
            .unwrap()
            .entry(dc.to_string())
            .or_default()
            .push_back(response);
        self.pushed.notify_waiters();
    }

    pub(crate) fn set_catalog(&self, dc: &str, service: &str, entries: Vec<CatalogService>) {
        self.catalog
            .lock()
            .unwrap()
            .insert((dc.to_string(), service.to_string()), entries);
    }

    /// Wait indexes of every health read issued against `dc`, in order
    pub(crate) fn wait_indexes(&self, dc: &str) -> Vec<u64> {
        self.wait_indexes
            .lock()
            .unwrap()
            .get(dc)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    /// Wait until `count` health reads have been issued against `dc`
    pub(crate) async fn wait_for_polls(&self, dc: &str, count: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while self.wait_indexes(dc).len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "expected {} polls against {:?}, saw {:?}",
            count,
            dc,
            self.wait_indexes(dc)
        );
    }

    fn pop(&self, dc: &str) -> Option<HealthResponse> {
        self.health.lock().unwrap().get_mut(dc).and_then(|q| q.pop_front())
    }
}

fn datacenter(options: &QueryOptions) -> String {
    options.datacenter.clone().unwrap_or_default()
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn health_service(
        &self,
        _service: &str,
        options: &QueryOptions,
    ) -> Result<(Vec<ServiceEntry>, QueryMeta)> {
        let dc = datacenter(options);
        self.wait_indexes
            .lock()
            .unwrap()
            .entry(dc.clone())
            .or_default()
            .push(options.wait_index);

        loop {
            let pushed = self.pushed.notified();
            if let Some(response) = self.pop(&dc) {
                return response.map(|(entries, last_index)| (entries, QueryMeta { last_index }));
            }
            pushed.await;
        }
    }

    async fn catalog_service(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<Vec<CatalogService>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        self.catalog
            .lock()
            .unwrap()
            .get(&(datacenter(options), service.to_string()))
            .cloned()
            .ok_or_else(|| DiscoveryError::UnexpectedStatus {
                status: 500,
                body: format!("no catalog for {}", service),
            })
    }
}

pub(crate) fn passing_check(service_id: &str, service_name: &str) -> HealthCheck {
    HealthCheck {
        node: format!("node-{}", service_id),
        check_id: format!("service:{}", service_id),
        name: format!("Service '{}' check", service_name),
        status: "passing".to_string(),
        service_id: service_id.to_string(),
        service_name: service_name.to_string(),
        ..Default::default()
    }
}

pub(crate) fn entry(checks: Vec<HealthCheck>) -> ServiceEntry {
    ServiceEntry {
        checks,
        ..Default::default()
    }
}

pub(crate) fn catalog_entry(
    dc: &str,
    service_id: &str,
    service_name: &str,
    address: &str,
    port: u16,
) -> CatalogService {
    CatalogService {
        node: format!("node-{}", service_id),
        address: address.to_string(),
        datacenter: dc.to_string(),
        service_id: service_id.to_string(),
        service_name: service_name.to_string(),
        service_port: port,
        ..Default::default()
    }
}
