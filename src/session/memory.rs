//! In-process transport linking named nodes.
//!
//! Every node joined to a [`MemoryNetwork`] gets an inbox of
//! [`InboundEvent`]s. Opening a channel creates a tokio duplex pipe and hands
//! the far end to the remote inbox.

use crate::session::channel::{
    Channel, ChannelTransport, ControlMessage, InboundEvent, NodeInfo, TransportError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Bytes buffered in each direction of a channel.
const CHANNEL_BUFFER_BYTES: usize = 64 * 1024;

/// Pending inbound events per node.
const INBOX_CAPACITY: usize = 256;

struct NodeEntry {
    display_name: String,
    capabilities: Vec<String>,
    inbox: mpsc::Sender<InboundEvent>,
}

/// Shared registry of nodes.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<Mutex<HashMap<String, NodeEntry>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node; rejoining under the same id replaces the old inbox.
    pub fn join(
        &self,
        node_id: impl Into<String>,
        display_name: impl Into<String>,
        capabilities: &[&str],
    ) -> (MemoryTransport, mpsc::Receiver<InboundEvent>) {
        let node_id = node_id.into();
        let (inbox, receiver) = mpsc::channel(INBOX_CAPACITY);

        self.lock_nodes().insert(
            node_id.clone(),
            NodeEntry {
                display_name: display_name.into(),
                capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
                inbox,
            },
        );
        tracing::debug!("Node {node_id} joined the network");

        let transport = MemoryTransport {
            node_id,
            network: self.clone(),
        };
        (transport, receiver)
    }

    /// Remove a node; later opens towards it fail.
    pub fn disconnect(&self, node_id: &str) {
        if self.lock_nodes().remove(node_id).is_some() {
            tracing::debug!("Node {node_id} left the network");
        }
    }

    pub fn is_connected(&self, node_id: &str) -> bool {
        self.lock_nodes().contains_key(node_id)
    }

    fn inbox(&self, node_id: &str) -> Result<mpsc::Sender<InboundEvent>, TransportError> {
        self.lock_nodes()
            .get(node_id)
            .map(|entry| entry.inbox.clone())
            .ok_or_else(|| TransportError::NodeUnreachable(node_id.to_string()))
    }

    fn lock_nodes(&self) -> MutexGuard<'_, HashMap<String, NodeEntry>> {
        match self.nodes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One node's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    node_id: String,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl ChannelTransport for MemoryTransport {
    fn local_node_id(&self) -> &str {
        &self.node_id
    }

    async fn open_channel(&self, node_id: &str, path: &str) -> Result<Channel, TransportError> {
        let inbox = self.network.inbox(node_id)?;
        let (near, far) = tokio::io::duplex(CHANNEL_BUFFER_BYTES);

        let remote = Channel::new(self.node_id.clone(), path, Box::new(far));
        inbox
            .send(InboundEvent::ChannelOpened(remote))
            .await
            .map_err(|_| TransportError::Open(format!("{node_id} stopped listening on {path}")))?;

        Ok(Channel::new(node_id, path, Box::new(near)))
    }

    async fn send_message(
        &self,
        node_id: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let inbox = self.network.inbox(node_id)?;
        let message = ControlMessage {
            source_node_id: self.node_id.clone(),
            path: path.to_string(),
            payload: payload.to_vec(),
        };
        inbox
            .send(InboundEvent::Message(message))
            .await
            .map_err(|_| TransportError::NodeUnreachable(node_id.to_string()))
    }

    async fn reachable_nodes(&self, capability: &str) -> Result<Vec<NodeInfo>, TransportError> {
        let nodes = self.network.lock_nodes();
        let mut found: Vec<NodeInfo> = nodes
            .iter()
            .filter(|(id, entry)| {
                **id != self.node_id
                    && !entry.inbox.is_closed()
                    && entry.capabilities.iter().any(|c| c == capability)
            })
            .map(|(id, entry)| NodeInfo {
                id: id.clone(),
                display_name: entry.display_name.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::channel::CHANNEL_SENSOR_NUMBER;

    #[tokio::test]
    async fn test_open_channel_delivers_far_end() {
        let network = MemoryNetwork::new();
        let (watch, _watch_inbox) = network.join("watch", "Watch", &["motion"]);
        let (_phone, mut phone_inbox) = network.join("phone", "Phone", &[]);

        let mut channel = watch.open_channel("phone", CHANNEL_SENSOR_NUMBER).await.unwrap();
        assert_eq!(channel.node_id(), "phone");
        channel.write_all(b"3").await.unwrap();
        channel.close().await.unwrap();

        match phone_inbox.recv().await.unwrap() {
            InboundEvent::ChannelOpened(mut remote) => {
                assert_eq!(remote.node_id(), "watch");
                assert_eq!(remote.path(), CHANNEL_SENSOR_NUMBER);
                assert_eq!(remote.read_to_end().await.unwrap(), b"3".to_vec());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_node_is_unreachable() {
        let network = MemoryNetwork::new();
        let (watch, _inbox) = network.join("watch", "Watch", &[]);

        let err = watch.open_channel("phone", CHANNEL_SENSOR_NUMBER).await.unwrap_err();
        assert!(matches!(err, TransportError::NodeUnreachable(_)));
    }

    #[tokio::test]
    async fn test_disconnect_breaks_link() {
        let network = MemoryNetwork::new();
        let (watch, _watch_inbox) = network.join("watch", "Watch", &[]);
        let (_phone, _phone_inbox) = network.join("phone", "Phone", &[]);

        network.disconnect("phone");
        assert!(!network.is_connected("phone"));
        assert!(watch.send_message("phone", "/ping", b"").await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_inbox_fails_open() {
        let network = MemoryNetwork::new();
        let (watch, _watch_inbox) = network.join("watch", "Watch", &[]);
        let (_phone, phone_inbox) = network.join("phone", "Phone", &[]);
        drop(phone_inbox);

        let err = watch.open_channel("phone", CHANNEL_SENSOR_NUMBER).await.unwrap_err();
        assert!(matches!(err, TransportError::Open(_)));
    }

    #[tokio::test]
    async fn test_reachable_nodes_filters_by_capability() {
        let network = MemoryNetwork::new();
        let (phone, _phone_inbox) = network.join("phone", "Phone", &[]);
        let (_w1, _i1) = network.join("watch-b", "Watch B", &["motion"]);
        let (_w2, _i2) = network.join("watch-a", "Watch A", &["motion"]);
        let (_tv, _i3) = network.join("tv", "TV", &["media"]);

        let nodes = phone.reachable_nodes("motion").await.unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["watch-a", "watch-b"]);
    }

    #[tokio::test]
    async fn test_control_message_carries_source() {
        let network = MemoryNetwork::new();
        let (phone, _phone_inbox) = network.join("phone", "Phone", &[]);
        let (_watch, mut watch_inbox) = network.join("watch", "Watch", &[]);

        phone.send_message("watch", "/ping", b"hi").await.unwrap();
        match watch_inbox.recv().await.unwrap() {
            InboundEvent::Message(message) => {
                assert_eq!(message.source_node_id, "phone");
                assert_eq!(message.path, "/ping");
                assert_eq!(message.payload, b"hi".to_vec());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
