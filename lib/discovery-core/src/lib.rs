//! Core service discovery types
//!
//! This library provides:
//! - Endpoint and cluster model with explicit change detection
//! - Health check records and the passing-set filter
//! - The registry client seam used by watchers
//! - Cluster registry for holding the latest discovered view

pub mod client;
pub mod cluster;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod registry;

pub use client::{CatalogService, QueryMeta, QueryOptions, RegistryClient, ServiceEntry};
pub use cluster::{clusters_changed, Cluster};
pub use endpoint::Endpoint;
pub use error::{DiscoveryError, Result};
pub use health::{checks_equal, passing_checks, HealthCheck};
pub use registry::ClusterRegistry;
