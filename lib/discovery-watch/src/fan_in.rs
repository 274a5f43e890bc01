//! Fan-in over a variable number of per-datacenter cluster channels

use discovery_core::Cluster;
use futures::stream::{self, BoxStream, SelectAll};
use futures::StreamExt;
use tokio::sync::mpsc;

/// Something that happened on one datacenter's channel
#[derive(Debug)]
pub enum DomainEvent {
    /// The datacenter published a new cluster list
    Update { index: usize, clusters: Vec<Cluster> },
    /// The datacenter's channel closed; it will not produce again
    Closed { index: usize },
}

/// Multiplexes datacenter channels, yielding whichever is ready first.
///
/// Each channel keeps the index it was pushed at. A closed channel reports
/// [`DomainEvent::Closed`] once and is then dropped from the set.
pub struct DomainFanIn {
    streams: SelectAll<BoxStream<'static, DomainEvent>>,
    pushed: usize,
    active: usize,
}

impl DomainFanIn {
    pub fn new() -> Self {
        Self {
            streams: SelectAll::new(),
            pushed: 0,
            active: 0,
        }
    }

    /// Add a channel and return its index
    pub fn push(&mut self, rx: mpsc::Receiver<Vec<Cluster>>) -> usize {
        let index = self.pushed;
        self.streams.push(domain_stream(index, rx));
        self.pushed += 1;
        self.active += 1;
        index
    }

    /// Channels that have not closed yet
    pub fn active(&self) -> usize {
        self.active
    }

    /// Wait for the next event. Returns `None` once every channel has closed.
    pub async fn next(&mut self) -> Option<DomainEvent> {
        let event = self.streams.next().await;
        if let Some(DomainEvent::Closed { .. }) = event {
            self.active -= 1;
        }
        event
    }
}

impl Default for DomainFanIn {
    fn default() -> Self {
        Self::new()
    }
}

fn domain_stream(index: usize, rx: mpsc::Receiver<Vec<Cluster>>) -> BoxStream<'static, DomainEvent> {
    stream::unfold(Some(rx), move |state| async move {
        let mut rx = match state {
            Some(rx) => rx,
            None => return None,
        };
        match rx.recv().await {
            Some(clusters) => Some((DomainEvent::Update { index, clusters }, Some(rx))),
            None => Some((DomainEvent::Closed { index }, None)),
        }
    })
    .boxed()
}
