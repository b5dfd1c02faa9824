//! Transport contract between replication nodes.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{NodeId, NodeMessage, ReplicationError, Result};

/// Stream of inbound messages handed to a registered node.
pub type BusReceiver = mpsc::UnboundedReceiver<NodeMessage>;

/// Transport-only pub/sub primitive connecting the nodes.
///
/// Delivery is at-least-once with no ordering guarantee, and messages may
/// be dropped outright. The bootstrap full-resync path is the recovery
/// mechanism, so implementations do not need to be reliable.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Registers a node and returns its inbound message stream.
    async fn register(&self, node: &NodeId) -> Result<BusReceiver>;

    /// Removes a node's registration.
    async fn unregister(&self, node: &NodeId) -> Result<()>;

    /// Publishes a message. A `recipient` of `None` reaches every *other*
    /// registered node; senders never hear their own broadcasts.
    async fn send(&self, message: NodeMessage) -> Result<()>;
}

/// In-process bus for tests and single-process clusters.
#[derive(Default)]
pub struct InMemoryBus {
    nodes: RwLock<HashMap<NodeId, mpsc::UnboundedSender<NodeMessage>>>,
}

impl InMemoryBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn register(&self, node: &NodeId) -> Result<BusReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.nodes.write().insert(node.clone(), tx);
        debug!(node = %node, "node registered on bus");
        Ok(rx)
    }

    async fn unregister(&self, node: &NodeId) -> Result<()> {
        self.nodes.write().remove(node);
        debug!(node = %node, "node unregistered from bus");
        Ok(())
    }

    async fn send(&self, message: NodeMessage) -> Result<()> {
        let nodes = self.nodes.read();
        match &message.recipient {
            Some(recipient) => {
                let Some(tx) = nodes.get(recipient) else {
                    // an unreachable recipient is a dropped message, not an
                    // error; the resync path covers it
                    debug!(recipient = %recipient, "dropping message for unknown node");
                    return Ok(());
                };
                tx.send(message.clone())
                    .map_err(|e| ReplicationError::Bus(e.to_string()))
            }
            None => {
                for (node, tx) in nodes.iter() {
                    if *node == message.sender {
                        continue;
                    }
                    // a closed receiver just misses the broadcast
                    let _ = tx.send(message.clone());
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodePayload;

    #[tokio::test]
    async fn test_direct_delivery() {
        let bus = InMemoryBus::new();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        let _rx_a = bus.register(&a).await.unwrap();
        let mut rx_b = bus.register(&b).await.unwrap();

        bus.send(NodeMessage::direct(
            a.clone(),
            b.clone(),
            NodePayload::RequestTeamList,
        ))
        .await
        .unwrap();

        let received = rx_b.recv().await.unwrap();
        assert_eq!(received.sender, a);
        assert_eq!(received.recipient, Some(b));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let bus = InMemoryBus::new();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        let c = NodeId::new("c");
        let mut rx_a = bus.register(&a).await.unwrap();
        let mut rx_b = bus.register(&b).await.unwrap();
        let mut rx_c = bus.register(&c).await.unwrap();

        bus.send(NodeMessage::broadcast(
            a.clone(),
            NodePayload::RequestTeamList,
        ))
        .await
        .unwrap();

        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_dropped_silently() {
        let bus = InMemoryBus::new();
        let a = NodeId::new("a");
        let _rx_a = bus.register(&a).await.unwrap();

        bus.send(NodeMessage::direct(
            a,
            NodeId::new("ghost"),
            NodePayload::RequestTeamList,
        ))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unregister() {
        let bus = InMemoryBus::new();
        let a = NodeId::new("a");
        let _rx = bus.register(&a).await.unwrap();
        assert_eq!(bus.node_count(), 1);

        bus.unregister(&a).await.unwrap();
        assert_eq!(bus.node_count(), 0);
    }
}
