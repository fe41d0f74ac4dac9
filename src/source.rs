//! Raw record acquisition
//!
//! The statistics dataset is an OData-style JSON document whose rows live under a
//! top-level key (`"value"` for the public dataset). Rows stay untyped here; the
//! [`Reducer`](crate::reducer::Reducer) maps them through the configured field names.

use std::path::Path;

use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::{Error, Result};

/// Extract the record array from a source document
///
/// Accepts either an object holding the rows under `records_key` or a bare array. An
/// object without that key holds no rows and yields an empty table.
///
/// # Errors
///
/// Returns [`Error::InvalidDocument`] when the bytes are not JSON, when the document is
/// neither an object nor an array, or when `records_key` holds something other than an
/// array.
pub fn parse_raw_document(bytes: &[u8], records_key: &str) -> Result<Vec<Value>> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidDocument(format!("not valid JSON: {e}")))?;

    match document {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove(records_key) {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Err(Error::InvalidDocument(format!(
                "'{records_key}' must be an array, found {}",
                json_type_name(&other)
            ))),
            None => {
                tracing::warn!(records_key, "source document has no record array");
                Ok(Vec::new())
            }
        },
        other => Err(Error::InvalidDocument(format!(
            "expected an object or array, found {}",
            json_type_name(&other)
        ))),
    }
}

/// Download the dataset from `config.url`
///
/// # Errors
///
/// Returns [`Error::Network`] for transport failures, [`Error::SourceStatus`] for a
/// non-success status and [`Error::InvalidDocument`] for an unusable body.
pub async fn fetch_raw_records(config: &SourceConfig) -> Result<Vec<Value>> {
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| Error::config("source", format!("failed to create HTTP client: {e}")))?;

    tracing::debug!(url = %config.url, "fetching raw traffic data");
    let response = client.get(&config.url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::SourceStatus {
            status: status.as_u16(),
            url: config.url.clone(),
        });
    }

    let bytes = response.bytes().await?;
    let rows = parse_raw_document(&bytes, &config.records_key)?;
    tracing::info!(url = %config.url, rows = rows.len(), "fetched raw traffic data");
    Ok(rows)
}

/// Read the dataset from a local JSON document
///
/// # Errors
///
/// Returns [`Error::Io`] when the file cannot be read and [`Error::InvalidDocument`]
/// for an unusable body.
pub async fn load_raw_records(path: &Path, records_key: &str) -> Result<Vec<Value>> {
    let bytes = tokio::fs::read(path).await?;
    let rows = parse_raw_document(&bytes, records_key)?;
    tracing::info!(path = ?path, rows = rows.len(), "loaded raw traffic data");
    Ok(rows)
}

/// Read from `config.file` when set, otherwise download from `config.url`
pub async fn acquire_raw_records(config: &SourceConfig) -> Result<Vec<Value>> {
    match &config.file {
        Some(path) => load_raw_records(path, &config.records_key).await,
        None => fetch_raw_records(config).await,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
