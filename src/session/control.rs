//! Start/stop control messages between the two devices.

use crate::session::channel::{
    ChannelTransport, ControlMessage, InboundEvent, NodeInfo, TransportError,
    MESSAGE_PATH_RECORDING_STARTED, MESSAGE_PATH_RECORDING_STOPPED,
};
use crate::session::coordinator::{SessionCoordinator, SessionError};
use crate::session::ui::UiSink;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of dispatching one control message on the wearable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Started,
    Stopped,
    /// Stop arrived with no session running
    AlreadyIdle,
    Ignored,
}

/// Wearable-side message listener driving the [`SessionCoordinator`].
pub struct WearableService {
    coordinator: Arc<SessionCoordinator>,
}

impl WearableService {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    /// Act on one control message; the sender becomes the session peer.
    pub async fn handle_message(
        &self,
        message: &ControlMessage,
    ) -> Result<ControlOutcome, SessionError> {
        tracing::info!("Message received: {} from {}", message.path, message.source_node_id);

        match message.path.as_str() {
            MESSAGE_PATH_RECORDING_STARTED => {
                self.coordinator
                    .start_session(Some(&message.source_node_id))
                    .await?;
                Ok(ControlOutcome::Started)
            }
            MESSAGE_PATH_RECORDING_STOPPED => match self.coordinator.stop_session().await? {
                Some(_) => Ok(ControlOutcome::Stopped),
                None => Ok(ControlOutcome::AlreadyIdle),
            },
            other => {
                tracing::warn!("Unrecognized message path: {other}");
                Ok(ControlOutcome::Ignored)
            }
        }
    }

    /// Dispatch inbound control messages until the inbox closes, then stop
    /// any session still running.
    pub async fn run(self, mut inbox: mpsc::Receiver<InboundEvent>) {
        while let Some(event) = inbox.recv().await {
            match event {
                InboundEvent::Message(message) => {
                    if let Err(e) = self.handle_message(&message).await {
                        tracing::warn!("Control message {} rejected: {e}", message.path);
                    }
                }
                InboundEvent::ChannelOpened(channel) => {
                    tracing::debug!(
                        "Ignoring channel {} from {}",
                        channel.path(),
                        channel.node_id()
                    );
                }
            }
        }
        self.coordinator.shutdown().await;
    }
}

/// Companion side: finds wearables and tells them to start or stop.
pub struct CompanionController {
    transport: Arc<dyn ChannelTransport>,
    ui: Arc<dyn UiSink>,
    capability: String,
}

impl CompanionController {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        ui: Arc<dyn UiSink>,
        capability: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            ui,
            capability: capability.into(),
        }
    }

    /// Wearables currently reachable.
    pub async fn discover(&self) -> Result<Vec<NodeInfo>, TransportError> {
        self.transport.reachable_nodes(&self.capability).await
    }

    /// Ask every reachable wearable to start recording; returns those reached.
    pub async fn start_recording(&self) -> Result<Vec<NodeInfo>, TransportError> {
        let reached = self.broadcast(MESSAGE_PATH_RECORDING_STARTED).await?;
        if reached.is_empty() {
            self.ui.status("No watch connected");
        } else {
            let names: Vec<&str> = reached.iter().map(|n| n.display_name.as_str()).collect();
            self.ui.status(&format!("Watch connected:\n{}", names.join("\n")));
        }
        Ok(reached)
    }

    /// Ask every reachable wearable to stop recording.
    pub async fn stop_recording(&self) -> Result<Vec<NodeInfo>, TransportError> {
        let reached = self.broadcast(MESSAGE_PATH_RECORDING_STOPPED).await?;
        if reached.is_empty() {
            self.ui.status("No watch connected");
        } else {
            self.ui.status("Recording stopped");
        }
        Ok(reached)
    }

    async fn broadcast(&self, path: &str) -> Result<Vec<NodeInfo>, TransportError> {
        let nodes = match self.discover().await {
            Ok(nodes) => nodes,
            Err(e) => {
                self.ui.status(&format!("Failed to find watch: {e}"));
                return Err(e);
            }
        };

        let mut reached = Vec::with_capacity(nodes.len());
        for node in nodes {
            match self.transport.send_message(&node.id, path, &[]).await {
                Ok(()) => reached.push(node),
                Err(e) => tracing::warn!("Could not send {path} to {}: {e}", node.id),
            }
        }
        Ok(reached)
    }
}
