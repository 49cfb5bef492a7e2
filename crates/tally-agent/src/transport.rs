//! Delivery of metric batches to the collector.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::error::Error as _;
use std::time::Duration;
use tally_common::retry::{Classification, ErrorClassifier};
use tally_common::types::MetricBatch;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Nothing is listening at the collector address yet.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The collector answered with a non-success status.
    #[error("collector responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if is_connection_refused(&err) {
            TransportError::ConnectionRefused(err.to_string())
        } else {
            TransportError::Request(err)
        }
    }
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// Sends one batch to the collector.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_batch(&self, batch: &MetricBatch) -> Result<(), TransportError>;
}

/// Only a refused connection is worth retrying at the network layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkClassifier;

impl ErrorClassifier<TransportError> for NetworkClassifier {
    fn classify(&self, err: &TransportError) -> Classification {
        match err {
            TransportError::ConnectionRefused(_) => Classification::Retriable,
            _ => Classification::NonRetriable,
        }
    }
}

/// Reporter-side classifier: server errors (5xx) are retried on top of
/// whatever [`NetworkClassifier`] allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryClassifier;

impl ErrorClassifier<TransportError> for DeliveryClassifier {
    fn classify(&self, err: &TransportError) -> Classification {
        match err {
            TransportError::Status { status, .. } if *status >= 500 => Classification::Retriable,
            other => NetworkClassifier.classify(other),
        }
    }
}

/// JSON-over-HTTP transport posting to `<endpoint>/updates/`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Request)?;
        Ok(Self {
            client,
            url: format!("{}/updates/", endpoint.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(&self, batch: &MetricBatch) -> Result<(), TransportError> {
        if batch.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(batch)?;
        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
