//! Upload of received session files to the training-data service.
//!
//! The session layer only sees the [`UploadSink`] capability. The HTTP
//! client behind the `upload` feature posts the raw CSV to
//! `{base_url}/api/training/data` with the project key in `x-api-key`.

use async_trait::async_trait;
use std::path::Path;

/// Upload endpoint configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Service base URL, e.g. `https://studio.edgeimpulse.com/v1`
    pub base_url: String,
}

impl UploadConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Get the ingestion endpoint URL.
    pub fn ingest_url(&self) -> String {
        format!("{}/api/training/data", self.base_url.trim_end_matches('/'))
    }
}

/// Upload error types.
#[derive(Debug)]
pub enum UploadError {
    /// Missing key or unusable client setup
    Config(String),
    /// The file could not be read
    Io(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Config(msg) => write!(f, "Upload config error: {msg}"),
            UploadError::Io(msg) => write!(f, "Upload file error: {msg}"),
            UploadError::Network(msg) => write!(f, "Upload network error: {msg}"),
            UploadError::Server { status, message } => {
                write!(f, "Upload server error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for UploadError {}

/// Fire-and-forget destination for completed session files.
#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn upload(&self, file: &Path, api_key: &str) -> Result<(), UploadError>;
}

/// HTTP client for the training-data ingestion endpoint.
#[cfg(feature = "upload")]
pub struct HttpUploader {
    config: UploadConfig,
    client: reqwest::Client,
}

#[cfg(feature = "upload")]
impl HttpUploader {
    pub fn new(config: UploadConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| UploadError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }
}

#[cfg(feature = "upload")]
#[async_trait]
impl UploadSink for HttpUploader {
    async fn upload(&self, file: &Path, api_key: &str) -> Result<(), UploadError> {
        if api_key.trim().is_empty() {
            return Err(UploadError::Config("API key is empty".to_string()));
        }

        let body = tokio::fs::read(file)
            .await
            .map_err(|e| UploadError::Io(format!("{}: {e}", file.display())))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "sensor_data.csv".to_string());

        let response = self
            .client
            .post(self.config.ingest_url())
            .header("x-api-key", api_key)
            .header("x-file-name", file_name)
            .header("Content-Type", "text/csv")
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::Server {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!("Uploaded {}", file.display());
        Ok(())
    }
}
