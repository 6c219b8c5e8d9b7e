//! Cluster membership collaborator.
//!
//! The lifecycle controller needs the current live-node set for two
//! things: intersecting it with a job's eligible nodes to find the update
//! leader, and reacting to a node leaving or failing mid-job. Discovery
//! is the tracker's only source of either.

use crate::tracker::types::NodeId;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// A membership change delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Joined(NodeId),
    Left(NodeId),
    Failed(NodeId),
}

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn live_nodes(&self) -> BTreeSet<NodeId>;

    fn subscribe(&self) -> broadcast::Receiver<NodeEvent>;
}

/// Fixed membership for tests and single-process wiring: nodes can be
/// marked departed at will, but nothing ever joins after construction.
pub struct StaticDiscovery {
    live: Arc<RwLock<BTreeSet<NodeId>>>,
    events: broadcast::Sender<NodeEvent>,
}

impl StaticDiscovery {
    pub fn new(initial: impl IntoIterator<Item = NodeId>) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            live: Arc::new(RwLock::new(initial.into_iter().collect())),
            events,
        }
    }

    pub async fn mark_left(&self, node: NodeId) {
        self.live.write().await.remove(&node);
        let _ = self.events.send(NodeEvent::Left(node));
    }

    pub async fn mark_failed(&self, node: NodeId) {
        self.live.write().await.remove(&node);
        let _ = self.events.send(NodeEvent::Failed(node));
    }

    pub async fn mark_joined(&self, node: NodeId) {
        self.live.write().await.insert(node.clone());
        let _ = self.events.send(NodeEvent::Joined(node));
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn live_nodes(&self) -> BTreeSet<NodeId> {
        self.live.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_left_removes_from_live_set_and_notifies() {
        let discovery = StaticDiscovery::new([NodeId::from("a"), NodeId::from("b")]);
        let mut rx = discovery.subscribe();
        discovery.mark_left(NodeId::from("a")).await;
        assert_eq!(discovery.live_nodes().await, [NodeId::from("b")].into());
        assert_eq!(rx.recv().await.unwrap(), NodeEvent::Left(NodeId::from("a")));
    }
}
