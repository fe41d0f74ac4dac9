//! Error types for traffic-relay
//!
//! Only contract violations surface as [`Error`]: bad configuration, an unreadable
//! source document, I/O failures on work item files, or a malformed record when the
//! reducer runs with [`MalformedPolicy::Abort`](crate::config::MalformedPolicy::Abort).
//! Expected per-item conditions (invalid traffic data, rejected deliveries) are
//! reported as [`DeliveryOutcome`](crate::types::DeliveryOutcome) values instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for traffic-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for traffic-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "sink.url")
        key: Option<String>,
    },

    /// A raw record is missing a field the reducer needs
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] MalformedRecord),

    /// The source document could not be interpreted as a record table
    #[error("invalid source document: {0}")]
    InvalidDocument(String),

    /// The source endpoint answered with a non-success status
    #[error("source returned HTTP {status} for {url}")]
    SourceStatus {
        /// HTTP status code returned by the source
        status: u16,
        /// URL that was requested
        url: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled before it could finish
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::MalformedRecord(_) => "malformed_record",
            Error::InvalidDocument(_) => "invalid_document",
            Error::SourceStatus { .. } => "source_status",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
        }
    }
}

/// Details about a raw record the reducer could not use
///
/// Reported in [`Reduction::malformed`](crate::reducer::Reduction::malformed) when
/// malformed rows are skipped, or wrapped in [`Error::MalformedRecord`] when they abort
/// the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("record {index} is missing required field '{field}': {reason}")]
pub struct MalformedRecord {
    /// Position of the row in the raw input
    pub index: usize,
    /// Source field name that was missing or unusable
    pub field: String,
    /// What was wrong with it
    pub reason: String,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_helper_records_the_key() {
        let err = Error::config("sink.url", "relative URL without a base");
        match &err {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("sink.url"));
                assert_eq!(message, "relative URL without a base");
            }
            other => panic!("expected Config, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "configuration error: relative URL without a base"
        );
    }

    #[test]
    fn malformed_record_converts_and_keeps_details() {
        let detail = MalformedRecord {
            index: 7,
            field: "SpatialDim".into(),
            reason: "field is absent".into(),
        };
        let err: Error = detail.clone().into();

        assert_eq!(err.error_code(), "malformed_record");
        assert_eq!(
            err.to_string(),
            "malformed record: record 7 is missing required field 'SpatialDim': field is absent"
        );
        match err {
            Error::MalformedRecord(inner) => assert_eq!(inner, detail),
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn error_codes_are_distinct_per_variant() {
        let errors = vec![
            Error::config("k", "m"),
            Error::MalformedRecord(MalformedRecord {
                index: 0,
                field: "f".into(),
                reason: "r".into(),
            }),
            Error::InvalidDocument("x".into()),
            Error::SourceStatus {
                status: 503,
                url: "http://localhost".into(),
            },
            Error::Io(std::io::Error::other("disk")),
            Error::Serialization(
                serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json"),
            ),
            Error::Cancelled,
        ];

        let mut codes: Vec<_> = errors.iter().map(Error::error_code).collect();
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), total, "every variant needs its own code");
    }

    #[test]
    fn source_status_message_names_url_and_status() {
        let err = Error::SourceStatus {
            status: 404,
            url: "https://example.com/data.json".into(),
        };
        assert_eq!(
            err.to_string(),
            "source returned HTTP 404 for https://example.com/data.json"
        );
    }
}
