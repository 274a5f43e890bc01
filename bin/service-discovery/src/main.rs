use anyhow::Result;
use discovery_consul::ConsulClient;
use discovery_core::{Cluster, ClusterRegistry};
use discovery_watch::{ServiceWatch, WatchMetrics};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod http;

use config::Config;
use http::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting service-discovery daemon...");

    let config = Config::from_env()?;
    info!("Consul agent: {}", config.consul.address);

    let client = Arc::new(ConsulClient::new(config.consul.clone())?);
    let metrics = WatchMetrics::new()?;
    let registry = ClusterRegistry::new();
    let cancel = CancellationToken::new();

    let watch = ServiceWatch::new(client, config.service.clone(), &config.datacenters)
        .with_statuses(config.statuses.clone())
        .with_options(config.watch.clone())
        .with_metrics(metrics.clone());
    info!(
        "Watching service {} in {} datacenters (statuses: {:?}, tag: {})",
        config.service,
        watch.datacenters().len(),
        config.statuses,
        config.watch.env_tag
    );
    let updates = watch.spawn(cancel.clone());
    let mirror = tokio::spawn(mirror_updates(updates, registry.clone()));

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("HTTP server listening on {}", config.listen_addr);
    let state = Arc::new(AppState { registry, metrics });
    tokio::spawn(http::serve(listener, state, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");
    cancel.cancel();

    if let Err(e) = mirror.await {
        error!("Cluster mirror task failed: {}", e);
    }

    Ok(())
}

/// Copy every merged update into the registry served over HTTP
async fn mirror_updates(mut updates: mpsc::Receiver<Vec<Cluster>>, registry: ClusterRegistry) {
    while let Some(clusters) = updates.recv().await {
        for cluster in clusters {
            info!(
                "Service {} now has {} endpoints",
                cluster.name,
                cluster.endpoints.len()
            );
            registry.update_cluster(cluster).await;
        }
    }
}
