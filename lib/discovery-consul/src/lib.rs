//! Consul HTTP API integration
pub mod client;
pub mod config;

pub use client::ConsulClient;
pub use config::ConsulConfig;
