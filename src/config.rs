//! Configuration types for traffic-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Source field names for the raw record table
///
/// The upstream dataset uses generic dimension names; they are an external contract
/// and may change, so they are configurable rather than hard-coded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field holding the country code (default: "SpatialDim")
    #[serde(default = "default_country_field")]
    pub country: String,

    /// Field holding the year (default: "TimeDim")
    #[serde(default = "default_year_field")]
    pub year: String,

    /// Field holding the fatality rate (default: "NumericValue")
    #[serde(default = "default_rate_field")]
    pub rate: String,

    /// Field holding the gender category (default: "Dim1")
    #[serde(default = "default_gender_field")]
    pub gender: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            country: default_country_field(),
            year: default_year_field(),
            rate: default_rate_field(),
            gender: default_gender_field(),
        }
    }
}

/// Where raw records come from
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL of the JSON dataset
    #[serde(default = "default_source_url")]
    pub url: String,

    /// Local JSON document to read instead of the URL
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Top-level key holding the record array (default: "value")
    #[serde(default = "default_records_key")]
    pub records_key: String,

    /// Request timeout for the download (default: 60 seconds)
    #[serde(default = "default_source_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Field name mapping for the record table
    #[serde(default)]
    pub fields: FieldMapping,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            file: None,
            records_key: default_records_key(),
            timeout: default_source_timeout(),
            fields: FieldMapping::default(),
        }
    }
}

/// What the reducer does with a row that survives filtering but lacks a country
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Drop the row, log a warning and report it in the reduction (default)
    #[default]
    Skip,
    /// Fail the whole reduction
    Abort,
}

/// Business rules applied before selecting one record per country
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Exclusive upper bound on the rate (default: 5.0)
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,

    /// Gender category to keep (default: "BTSX", both sexes)
    #[serde(default = "default_gender")]
    pub gender: String,

    /// Handling of malformed rows
    #[serde(default)]
    pub malformed: MalformedPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_rate: default_max_rate(),
            gender: default_gender(),
            malformed: MalformedPolicy::default(),
        }
    }
}

/// Downstream HTTP sink
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SinkConfig {
    /// URL to POST traffic data to
    #[serde(default = "default_sink_url")]
    pub url: String,

    /// HTTP client timeout for a single request (default: 30 seconds)
    #[serde(default = "default_sink_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Optional Authorization header value
    #[serde(default)]
    pub auth_header: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: default_sink_url(),
            timeout: default_sink_timeout(),
            auth_header: None,
        }
    }
}

/// Delivery engine settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Upper bound on one sink call, independent of the sink implementation
    /// (default: 30 seconds, None = unbounded)
    #[serde(
        default = "default_attempt_timeout",
        with = "optional_duration_serde"
    )]
    pub attempt_timeout: Option<Duration>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

/// Largest accepted [`RetryConfig::backoff_multiplier`]
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Retry configuration for run-level transient failures (source acquisition)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff, 1.0 to 10.0 (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Intermediate artifacts
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write the produced work items here before delivery (None = keep in memory only)
    #[serde(default)]
    pub work_items_path: Option<PathBuf>,
}

/// Main configuration for the pipeline
///
/// Every sub-config has sensible defaults, so `Config::default()` targets the public
/// dataset and sales-system endpoint out of the box.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Raw data acquisition
    #[serde(default)]
    pub source: SourceConfig,

    /// Reduction business rules
    #[serde(default)]
    pub filter: FilterConfig,

    /// HTTP sink
    #[serde(default)]
    pub sink: SinkConfig,

    /// Delivery engine
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Run-level retry for acquisition
    #[serde(default)]
    pub retry: RetryConfig,

    /// Intermediate artifacts
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Check settings that would otherwise fail late, in the middle of a run
    pub fn validate(&self) -> Result<()> {
        if self.source.file.is_none() {
            validate_url("source.url", &self.source.url)?;
        }
        validate_url("sink.url", &self.sink.url)?;

        if !self.filter.max_rate.is_finite() {
            return Err(Error::config(
                "filter.max_rate",
                format!("max_rate must be finite, got {}", self.filter.max_rate),
            ));
        }
        if self.filter.gender.trim().is_empty() {
            return Err(Error::config("filter.gender", "gender code is empty"));
        }

        let fields = &self.source.fields;
        for (key, name) in [
            ("source.fields.country", &fields.country),
            ("source.fields.year", &fields.year),
            ("source.fields.rate", &fields.rate),
            ("source.fields.gender", &fields.gender),
        ] {
            if name.is_empty() {
                return Err(Error::config(key, "field name is empty"));
            }
        }

        for (key, timeout) in [
            ("source.timeout", Some(self.source.timeout)),
            ("sink.timeout", Some(self.sink.timeout)),
            ("delivery.attempt_timeout", self.delivery.attempt_timeout),
        ] {
            if timeout.is_some_and(|t| t.is_zero()) {
                return Err(Error::config(
                    key,
                    "timeout is zero, every request would time out",
                ));
            }
        }

        let multiplier = self.retry.backoff_multiplier;
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&multiplier) {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!(
                    "backoff multiplier must be between 1.0 and {MAX_BACKOFF_MULTIPLIER}, got {multiplier}"
                ),
            ));
        }

        Ok(())
    }
}

fn validate_url(key: &str, raw: &str) -> Result<()> {
    let parsed =
        url::Url::parse(raw).map_err(|e| Error::config(key, format!("invalid URL '{raw}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::config(
            key,
            format!("unsupported URL scheme '{other}' in '{raw}'"),
        )),
    }
}

fn default_country_field() -> String {
    "SpatialDim".to_string()
}

fn default_year_field() -> String {
    "TimeDim".to_string()
}

fn default_rate_field() -> String {
    "NumericValue".to_string()
}

fn default_gender_field() -> String {
    "Dim1".to_string()
}

fn default_source_url() -> String {
    "https://github.com/robocorp/inhuman-insurance-inc/raw/main/RS_198.json".to_string()
}

fn default_records_key() -> String {
    "value".to_string()
}

fn default_source_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_rate() -> f64 {
    5.0
}

fn default_gender() -> String {
    "BTSX".to_string()
}

fn default_sink_url() -> String {
    "https://robocorp.com/inhuman-insurance-inc/sales-system-api".to_string()
}

fn default_sink_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_attempt_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
