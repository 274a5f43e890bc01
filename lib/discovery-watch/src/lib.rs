//! Continuous service discovery watches
//!
//! A [`DomainWatcher`] long-polls the registry for one service in one datacenter and
//! publishes the healthy endpoint set whenever it effectively changes. A
//! [`ServiceWatch`] runs one watcher per datacenter and merges their output into a
//! single cluster stream.

pub mod aggregator;
pub mod fan_in;
pub mod metrics;
pub mod options;
pub mod session;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{parse_datacenters, AggregateSession, ServiceWatch};
pub use fan_in::{DomainEvent, DomainFanIn};
pub use metrics::WatchMetrics;
pub use options::WatchOptions;
pub use session::{WatchCursor, WatchSession};
pub use watcher::DomainWatcher;

/// Capacity of every cluster channel; sends block until the consumer catches up
pub const CHANNEL_CAPACITY: usize = 1;
