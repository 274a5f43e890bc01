//! Consul HTTP client implementing the registry read API

use crate::ConsulConfig;
use async_trait::async_trait;
use discovery_core::{
    CatalogService, DiscoveryError, QueryMeta, QueryOptions, RegistryClient, Result, ServiceEntry,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, Url};
use std::time::Duration;
use tracing::debug;

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

/// ConsulClient issues health and catalog reads against a Consul agent
#[derive(Clone)]
pub struct ConsulClient {
    http: Client,
    base: Url,
    config: ConsulConfig,
}

impl ConsulClient {
    /// Create a new Consul client
    pub fn new(config: ConsulConfig) -> Result<Self> {
        let base = Url::parse(&config.address).map_err(|e| {
            DiscoveryError::InvalidConfiguration(format!(
                "Invalid Consul address {}: {}",
                config.address, e
            ))
        })?;
        if base.cannot_be_a_base() {
            return Err(DiscoveryError::InvalidConfiguration(format!(
                "Consul address {} cannot carry a path",
                config.address
            )));
        }

        let http = Client::builder()
            .build()
            .map_err(|e| DiscoveryError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base, config })
    }

    /// Get the client configuration
    pub fn config(&self) -> &ConsulConfig {
        &self.config
    }

    fn endpoint(&self, path: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url
    }

    fn request(&self, url: Url, options: &QueryOptions, timeout: Duration) -> RequestBuilder {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(dc) = &options.datacenter {
            query.push(("dc", dc.clone()));
        }
        if options.require_consistent {
            query.push(("consistent", String::new()));
        }
        if options.wait_index > 0 {
            query.push(("index", options.wait_index.to_string()));
            query.push(("wait", format!("{}s", self.config.wait_time.as_secs())));
        }

        let mut req = self.http.get(url).query(&query).timeout(timeout);
        if let Some(token) = &self.config.token {
            req = req.header(TOKEN_HEADER, token);
        }
        req
    }

    async fn send(req: RequestBuilder) -> Result<Response> {
        let response = req
            .send()
            .await
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(DiscoveryError::UnexpectedStatus { status, body })
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Read the blocking index from response headers
fn parse_index(headers: &HeaderMap) -> Result<u64> {
    let value = headers.get(INDEX_HEADER).ok_or(DiscoveryError::MissingIndex)?;
    let value = value
        .to_str()
        .map_err(|_| DiscoveryError::InvalidIndex(format!("{:?}", value)))?;
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| DiscoveryError::InvalidIndex(value.to_string()))
}

#[async_trait]
impl RegistryClient for ConsulClient {
    async fn health_service(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<(Vec<ServiceEntry>, QueryMeta)> {
        let url = self.endpoint(&["v1", "health", "service", service]);
        debug!(
            "Blocking health read for {} (dc={:?}, index={})",
            service, options.datacenter, options.wait_index
        );

        let req = self.request(url, options, self.config.blocking_timeout());
        let response = Self::send(req).await?;
        let last_index = parse_index(response.headers())?;
        let entries: Vec<ServiceEntry> = Self::json(response).await?;

        Ok((entries, QueryMeta { last_index }))
    }

    async fn catalog_service(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<Vec<CatalogService>> {
        let url = self.endpoint(&["v1", "catalog", "service", service]);
        let req = self.request(url, &options.clone().with_wait_index(0), self.config.request_timeout);
        let response = Self::send(req).await?;
        Self::json(response).await
    }
}
