//! Device-to-device channel transport.
//!
//! A channel is a named duplex byte stream to one remote node. Channels are
//! opened, written or read to the end, and closed; every logical exchange
//! uses a fresh channel.
//!
//! Payload bytes travel as length-prefixed frames. [`Channel::close`] writes
//! an empty frame as the end marker, so a reader can tell a finished payload
//! from a sender that went away mid-transfer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Channel carrying the number of available sensors.
pub const CHANNEL_SENSOR_NUMBER: &str = "/channel_sensor_number";
/// Channel carrying one live prediction.
pub const CHANNEL_PATH_PREDICTION: &str = "/channel_path_prediction";
/// Channel carrying the exported session file.
pub const CHANNEL_PATH_SENSOR_READING: &str = "/channel_path_sensor_reading";
/// Control message asking the wearable to start recording.
pub const MESSAGE_PATH_RECORDING_STARTED: &str = "/message_path_recording_started";
/// Control message asking the wearable to stop recording.
pub const MESSAGE_PATH_RECORDING_STOPPED: &str = "/message_path_recording_stopped";

/// Largest payload frame; longer writes are split.
const MAX_FRAME_BYTES: usize = 16 * 1024;

/// Logical channel paths known to both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPath {
    SensorCount,
    Prediction,
    SensorFile,
}

impl ChannelPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelPath::SensorCount => CHANNEL_SENSOR_NUMBER,
            ChannelPath::Prediction => CHANNEL_PATH_PREDICTION,
            ChannelPath::SensorFile => CHANNEL_PATH_SENSOR_READING,
        }
    }

    pub fn parse(path: &str) -> Option<Self> {
        match path {
            CHANNEL_SENSOR_NUMBER => Some(ChannelPath::SensorCount),
            CHANNEL_PATH_PREDICTION => Some(ChannelPath::Prediction),
            CHANNEL_PATH_SENSOR_READING => Some(ChannelPath::SensorFile),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport errors. Each one ends a single exchange, never a session.
#[derive(Debug)]
pub enum TransportError {
    /// No route to the node
    NodeUnreachable(String),
    /// Channel could not be opened
    Open(String),
    /// Read, write or close failed
    Io(std::io::Error),
    /// Payload did not have the expected shape
    InvalidPayload(String),
    /// Remote side went away before closing the channel
    Interrupted(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NodeUnreachable(node) => write!(f, "Node unreachable: {node}"),
            TransportError::Open(msg) => write!(f, "Failed to open channel: {msg}"),
            TransportError::Io(e) => write!(f, "Channel I/O error: {e}"),
            TransportError::InvalidPayload(msg) => write!(f, "Invalid payload: {msg}"),
            TransportError::Interrupted(path) => write!(f, "Channel {path} closed mid-transfer"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Byte stream underlying a channel.
pub trait ChannelStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ChannelStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// An open channel to a remote node.
pub struct Channel {
    node_id: String,
    path: String,
    stream: Box<dyn ChannelStream>,
}

impl Channel {
    pub fn new(
        node_id: impl Into<String>,
        path: impl Into<String>,
        stream: Box<dyn ChannelStream>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            path: path.into(),
            stream,
        }
    }

    /// Node on the other end.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        for frame in bytes.chunks(MAX_FRAME_BYTES) {
            self.write_frame(frame).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Stream a file's contents into the channel; returns bytes sent.
    pub async fn send_file(&mut self, file: &Path) -> Result<u64, TransportError> {
        let mut source = tokio::fs::File::open(file).await?;
        let mut buffer = vec![0u8; MAX_FRAME_BYTES];
        let mut sent = 0u64;
        loop {
            let n = source.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            self.write_frame(&buffer[..n]).await?;
            sent += n as u64;
        }
        self.stream.flush().await?;
        Ok(sent)
    }

    /// Read until the remote side closes.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::new();
        while let Some(frame) = self.read_frame().await? {
            buffer.extend_from_slice(&frame);
        }
        Ok(buffer)
    }

    /// Receive the remote side's payload into `file`; returns bytes written.
    ///
    /// On error `file` may hold a partial payload.
    pub async fn receive_file(&mut self, file: &Path) -> Result<u64, TransportError> {
        let mut target = tokio::fs::File::create(file).await?;
        let mut received = 0u64;
        while let Some(frame) = self.read_frame().await? {
            target.write_all(&frame).await?;
            received += frame.len() as u64;
        }
        target.flush().await?;
        Ok(received)
    }

    /// Write the end marker and close the write half.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.stream.write_u32(0).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.is_empty() {
            return Ok(());
        }
        // Frames never exceed MAX_FRAME_BYTES, so the length fits in u32.
        self.stream.write_u32(frame.len() as u32).await?;
        self.stream.write_all(frame).await?;
        Ok(())
    }

    /// Next payload frame; `None` at the end marker.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let len = match self.stream.read_u32().await {
            Ok(len) => len as usize,
            Err(e) => return Err(self.read_error(e)),
        };
        if len == 0 {
            return Ok(None);
        }
        if len > MAX_FRAME_BYTES {
            return Err(TransportError::InvalidPayload(format!("frame of {len} bytes")));
        }

        let mut frame = vec![0u8; len];
        let read = self.stream.read_exact(&mut frame).await;
        if let Err(e) = read {
            return Err(self.read_error(e));
        }
        Ok(Some(frame))
    }

    fn read_error(&self, e: std::io::Error) -> TransportError {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Interrupted(self.path.clone())
        } else {
            TransportError::Io(e)
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("node_id", &self.node_id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Fire-and-forget control message between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub source_node_id: String,
    pub path: String,
    pub payload: Vec<u8>,
}

/// Something arriving at a node from the transport.
#[derive(Debug)]
pub enum InboundEvent {
    ChannelOpened(Channel),
    Message(ControlMessage),
}

/// A remote node visible to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub display_name: String,
}

/// Device-to-device link.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Identifier of this node.
    fn local_node_id(&self) -> &str;

    /// Open a fresh channel on `path` to `node_id`.
    async fn open_channel(&self, node_id: &str, path: &str) -> Result<Channel, TransportError>;

    /// Send a control message to `node_id`.
    async fn send_message(
        &self,
        node_id: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Reachable nodes advertising `capability`.
    async fn reachable_nodes(&self, capability: &str) -> Result<Vec<NodeInfo>, TransportError>;
}

/// Open a channel, write `payload`, close it.
pub async fn send_payload(
    transport: &dyn ChannelTransport,
    node_id: &str,
    path: ChannelPath,
    payload: &[u8],
) -> Result<(), TransportError> {
    let mut channel = transport.open_channel(node_id, path.as_str()).await?;
    channel.write_all(payload).await?;
    channel.close().await
}
