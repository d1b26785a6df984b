//! Companion-side receiver.
//!
//! Each inbound channel is routed by path and handled in its own task:
//! sensor counts and predictions go to the UI, session files are stored
//! under the receive directory and optionally uploaded.

use crate::session::channel::{Channel, ChannelPath, InboundEvent, TransportError};
use crate::session::ui::UiSink;
use crate::transparency::SharedTransparencyLog;
use crate::upload::UploadSink;
use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Timestamp layout of received file names.
const FILE_STAMP_FORMAT: &str = "%Y.%m.%d_%H.%M.%S";

/// What a handled channel produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    SensorCount(u32),
    Prediction(String),
    File(PathBuf),
    Ignored(String),
}

struct UploadTarget {
    sink: Arc<dyn UploadSink>,
    api_key: String,
}

pub struct RemoteListener {
    ui: Arc<dyn UiSink>,
    receive_dir: PathBuf,
    timezone: Tz,
    upload: Option<UploadTarget>,
    log: SharedTransparencyLog,
}

impl RemoteListener {
    pub fn new(
        ui: Arc<dyn UiSink>,
        receive_dir: impl Into<PathBuf>,
        log: SharedTransparencyLog,
    ) -> Self {
        Self {
            ui,
            receive_dir: receive_dir.into(),
            timezone: Tz::UTC,
            upload: None,
            log,
        }
    }

    /// Zone used to stamp received file names.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Upload every received file with `api_key`.
    pub fn with_upload(mut self, sink: Arc<dyn UploadSink>, api_key: impl Into<String>) -> Self {
        self.upload = Some(UploadTarget {
            sink,
            api_key: api_key.into(),
        });
        self
    }

    /// Consume inbound events until the transport closes the inbox.
    pub async fn run(self: Arc<Self>, mut inbox: mpsc::Receiver<InboundEvent>) {
        tracing::info!("Companion listener started");
        while let Some(event) = inbox.recv().await {
            match event {
                InboundEvent::ChannelOpened(channel) => {
                    let listener = Arc::clone(&self);
                    tokio::spawn(async move {
                        let node = channel.node_id().to_string();
                        let path = channel.path().to_string();
                        if let Err(e) = listener.handle_channel(channel).await {
                            listener.log.record_exchange_failed();
                            tracing::warn!("Channel {path} from {node} failed: {e}");
                        }
                    });
                }
                InboundEvent::Message(message) => {
                    tracing::debug!(
                        "Ignoring control message {} from {}",
                        message.path,
                        message.source_node_id
                    );
                }
            }
        }
        tracing::info!("Companion listener stopped");
    }

    /// Handle one inbound channel to completion.
    pub async fn handle_channel(&self, mut channel: Channel) -> Result<Received, TransportError> {
        tracing::debug!("Channel opened: {} from {}", channel.path(), channel.node_id());

        let Some(path) = ChannelPath::parse(channel.path()) else {
            tracing::warn!("Unrecognized channel path: {}", channel.path());
            return Ok(Received::Ignored(channel.path().to_string()));
        };

        match path {
            ChannelPath::SensorCount => {
                let bytes = channel.read_to_end().await?;
                let count = parse_sensor_count(&bytes)?;
                self.ui.sensor_count(count);
                Ok(Received::SensorCount(count))
            }
            ChannelPath::Prediction => {
                let bytes = channel.read_to_end().await?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| TransportError::InvalidPayload("prediction is not UTF-8".into()))?;
                self.ui.prediction(&text);
                Ok(Received::Prediction(text))
            }
            ChannelPath::SensorFile => {
                let now = chrono::Utc::now().with_timezone(&self.timezone);
                let target = claim_received_file(&self.receive_dir, &now).await?;
                let bytes = match channel.receive_file(&target).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        if let Err(remove) = tokio::fs::remove_file(&target).await {
                            tracing::warn!(
                                "Could not remove partial {}: {remove}",
                                target.display()
                            );
                        }
                        return Err(e);
                    }
                };
                self.log.record_file_received();
                tracing::info!("Received {bytes} bytes into {}", target.display());

                self.ui.file_received(&target);
                self.spawn_upload(target.clone());
                Ok(Received::File(target))
            }
        }
    }

    fn spawn_upload(&self, file: PathBuf) {
        let Some(target) = &self.upload else {
            return;
        };
        let sink = Arc::clone(&target.sink);
        let api_key = target.api_key.clone();
        let log = Arc::clone(&self.log);

        tokio::spawn(async move {
            match sink.upload(&file, &api_key).await {
                Ok(()) => log.record_upload(true),
                Err(e) => {
                    log.record_upload(false);
                    tracing::error!("Failed to upload {}: {e}", file.display());
                }
            }
        });
    }
}

fn parse_sensor_count(bytes: &[u8]) -> Result<u32, TransportError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| {
            TransportError::InvalidPayload(format!(
                "sensor count '{}'",
                String::from_utf8_lossy(bytes)
            ))
        })
}

/// Base file name for a session received at `at`.
pub fn received_file_name<Z: TimeZone>(at: &DateTime<Z>, attempt: u32) -> String
where
    Z::Offset: std::fmt::Display,
{
    let stamp = at.format(FILE_STAMP_FORMAT);
    if attempt == 0 {
        format!("sensor_data_{stamp}.csv")
    } else {
        format!("sensor_data_{stamp}_{attempt}.csv")
    }
}

/// Create a fresh, uniquely named file under `dir`.
async fn claim_received_file<Z: TimeZone>(dir: &Path, at: &DateTime<Z>) -> std::io::Result<PathBuf>
where
    Z::Offset: std::fmt::Display,
{
    tokio::fs::create_dir_all(dir).await?;
    let mut attempt = 0;
    loop {
        let candidate = dir.join(received_file_name(at, attempt));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}
