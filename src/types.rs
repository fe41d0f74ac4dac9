//! Core types for traffic-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::MalformedRecord;

/// Message carried by the historical "nothing to deliver" work item
pub const NO_DATA_MESSAGE: &str = "No payloads to save";

/// One row of the raw statistics table after field mapping
///
/// `year` and `rate` keep the source's JSON values untouched so they reach the sink
/// exactly as published.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Country code as supplied by the source (not guaranteed to be 3 letters)
    pub country_code: String,
    /// Reporting year as published, `Value::Null` when absent
    pub year: Value,
    /// Fatality rate as published, lower passes the filter
    pub rate: Value,
    /// Gender category (e.g. "BTSX", "MLE", "FMLE")
    pub gender_code: String,
}

impl RawRecord {
    /// Year used for ordering; an unusable year sorts as 0
    pub fn year_ordinal(&self) -> i64 {
        year_from_value(&self.year).unwrap_or(0)
    }
}

/// Interpret a published year for ordering
///
/// Integers, whole floats and numeric strings are usable; anything else is not.
pub fn year_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The body delivered to the sink for one country
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficData {
    /// Country code
    pub country: String,
    /// Reporting year, copied from the raw record
    pub year: Value,
    /// Fatality rate, copied from the raw record
    pub rate: Value,
}

impl From<&RawRecord> for TrafficData {
    fn from(record: &RawRecord) -> Self {
        Self {
            country: record.country_code.clone(),
            year: record.year.clone(),
            rate: record.rate.clone(),
        }
    }
}

/// Envelope handed from the reducer to the delivery engine
///
/// The payload stays a JSON object so that work items written by other producers can
/// be loaded and classified even when their `traffic_data` is malformed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Item payload, normally `{"traffic_data": {...}}`
    pub payload: Map<String, Value>,
    /// Attached files (always empty for this pipeline)
    #[serde(default)]
    pub files: Map<String, Value>,
}

impl WorkItem {
    /// Wrap traffic data in the standard envelope
    pub fn new(traffic_data: &TrafficData) -> Self {
        let mut payload = Map::new();
        payload.insert("traffic_data".to_string(), json!(traffic_data));
        Self {
            payload,
            files: Map::new(),
        }
    }

    /// The sentinel item some producers emit when a batch is empty
    ///
    /// The reducer never emits this; it exists for files written by other tools.
    pub fn no_data() -> Self {
        let mut payload = Map::new();
        payload.insert("message".to_string(), json!(NO_DATA_MESSAGE));
        Self {
            payload,
            files: Map::new(),
        }
    }

    /// The `traffic_data` object, or `{}` when the payload has none
    pub fn traffic_data(&self) -> Value {
        self.payload
            .get("traffic_data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// The payload as a JSON value, for diagnostics
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

/// Classification of a processed work item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Sink accepted the item
    Delivered,
    /// Business error: the traffic data failed validation
    InvalidData,
    /// Application error: the sink rejected the item on both attempts
    DeliveryFailed,
}

impl OutcomeKind {
    /// Tag used in log lines, e.g. "BUSINESS ERROR: INVALID_TRAFFIC_DATA"
    pub fn tag(&self) -> &'static str {
        match self {
            OutcomeKind::Delivered => "DELIVERED",
            OutcomeKind::InvalidData => "BUSINESS ERROR: INVALID_TRAFFIC_DATA",
            OutcomeKind::DeliveryFailed => "APPLICATION ERROR: TRAFFIC_DATA_POST_FAILED",
        }
    }
}

/// Result of processing one work item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The sink answered 200
    Delivered {
        /// The delivered traffic data
        traffic_data: Value,
        /// Number of sink calls made (1 or 2)
        attempts: u32,
    },

    /// The traffic data failed the 3-letter country code rule; the sink was not called
    InvalidData {
        /// Full payload of the rejected item
        payload: Value,
    },

    /// Both attempts failed
    DeliveryFailed {
        /// Message reported by the sink on the last attempt
        message: String,
        /// Status code of the last attempt (0 for transport failures)
        status: u16,
        /// The traffic data that could not be delivered
        traffic_data: Value,
    },
}

impl DeliveryOutcome {
    /// Classification of this outcome
    pub fn kind(&self) -> OutcomeKind {
        match self {
            DeliveryOutcome::Delivered { .. } => OutcomeKind::Delivered,
            DeliveryOutcome::InvalidData { .. } => OutcomeKind::InvalidData,
            DeliveryOutcome::DeliveryFailed { .. } => OutcomeKind::DeliveryFailed,
        }
    }

    /// True when the item reached the sink
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Summary of one pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    /// Items accepted by the sink
    pub delivered: usize,
    /// Items rejected as business errors
    pub invalid: usize,
    /// Items rejected as application errors
    pub failed: usize,
    /// Raw rows skipped as malformed during reduction
    pub malformed: usize,
    /// Items left unprocessed because the run was cancelled
    pub cancelled_remaining: usize,
    /// When processing started
    pub started_at: DateTime<Utc>,
    /// When processing finished
    pub finished_at: DateTime<Utc>,
    /// Per-item outcomes in input order
    pub outcomes: Vec<DeliveryOutcome>,
}

impl BatchReport {
    /// Tally outcomes into a report
    pub fn from_outcomes(
        outcomes: Vec<DeliveryOutcome>,
        cancelled_remaining: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        let count = |kind: OutcomeKind| outcomes.iter().filter(|o| o.kind() == kind).count();
        Self {
            delivered: count(OutcomeKind::Delivered),
            invalid: count(OutcomeKind::InvalidData),
            failed: count(OutcomeKind::DeliveryFailed),
            malformed: 0,
            cancelled_remaining,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    /// Total number of processed items
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    /// True when a delivery failed or a raw record was malformed
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.malformed > 0
    }

    /// Suggested process exit code for a wrapping command-line tool
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() { 1 } else { 0 }
    }
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Raw records were acquired
    RecordsFetched {
        /// Number of raw rows
        count: usize,
    },

    /// A raw row was skipped during reduction
    RecordSkipped {
        /// Why the row was skipped
        record: MalformedRecord,
    },

    /// Reduction produced nothing to deliver
    BatchEmpty {
        /// Human-readable notice
        message: String,
    },

    /// Delivery of a batch is starting
    BatchStarted {
        /// Number of work items in the batch
        items: usize,
    },

    /// One work item was processed
    ItemProcessed {
        /// Position of the item in the batch
        index: usize,
        /// Its outcome
        outcome: DeliveryOutcome,
    },

    /// Delivery of a batch finished
    BatchCompleted {
        /// Items accepted by the sink
        delivered: usize,
        /// Business errors
        invalid: usize,
        /// Application errors
        failed: usize,
        /// Items left unprocessed by cancellation
        cancelled_remaining: usize,
    },
}
