//! Delivery sinks
//!
//! A [`Sink`] accepts one `traffic_data` body and reports the status code and JSON body
//! it got back. Transport problems (connection refused, timeouts) are returned as
//! [`TransportError`] so the delivery engine can fold them into its retry path.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::SinkConfig;
use crate::error::{Error, Result};

/// Status and body returned by a sink for one attempt
#[derive(Clone, Debug, PartialEq)]
pub struct SinkResponse {
    /// HTTP status code, 0 when the sink could not be reached
    pub status: u16,
    /// Decoded JSON body, `Value::Null` when the body was empty or not JSON
    pub body: Value,
}

impl SinkResponse {
    /// Build a response from a status and body
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Synthetic status-0 response describing a transport failure
    pub fn transport_failure(error: &TransportError) -> Self {
        Self {
            status: 0,
            body: serde_json::json!({ "message": error.to_string() }),
        }
    }

    /// True for status 200, the only status the engine accepts
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// The `message` field of the body, if it is a string
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

/// The sink could not be reached or did not answer in time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No answer within the allotted time
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure before a status was received
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Destination for validated traffic data
///
/// Implementations must not retry on their own; the delivery engine owns the retry
/// policy.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one `traffic_data` body
    async fn post(&self, traffic_data: &Value) -> std::result::Result<SinkResponse, TransportError>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Sink that POSTs JSON to an HTTP endpoint
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    timeout: std::time::Duration,
    auth_header: Option<String>,
}

impl HttpSink {
    /// Build an HTTP sink from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the HTTP client cannot be built.
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config("sink", format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout: config.timeout,
            auth_header: config.auth_header.clone(),
        })
    }

    /// Endpoint this sink posts to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn post(&self, traffic_data: &Value) -> std::result::Result<SinkResponse, TransportError> {
        let mut request = self.client.post(&self.url).json(traffic_data);
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        // A sink may answer with an empty or non-JSON body; only the status matters then.
        let body = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "failed to read sink response body");
                Value::Null
            }
        };

        Ok(SinkResponse { status, body })
    }

    fn name(&self) -> &str {
        "http"
    }
}
