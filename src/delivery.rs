//! Delivery engine: validate, post, retry once, classify
//!
//! Each work item moves through a small state machine:
//!
//! ```text
//! Pending -> Validating -> Invalid                        (terminal)
//!                       -> Delivering(1) -> Delivered     (terminal)
//!                                        -> Delivering(2) -> Delivered | Failed
//! ```
//!
//! Items are processed one at a time, in input order. A failing item never stops the
//! batch. Cancellation is only observed between items; an attempt in flight always
//! completes.
//!
//! The engine always retries exactly once. Callers that need backoff or more attempts
//! should wrap [`attempt_delivery`] instead of changing [`MAX_DELIVERY_ATTEMPTS`].

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::DeliveryConfig;
use crate::sink::{Sink, SinkResponse, TransportError};
use crate::types::{DeliveryOutcome, WorkItem};

/// Total sink calls per item: the first attempt plus one retry
pub const MAX_DELIVERY_ATTEMPTS: u32 = 2;

/// Message used when a failed response carries no `message` field
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Outcomes of a delivery run that may have been cancelled
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeliveryReport {
    /// One outcome per processed item, in input order
    pub outcomes: Vec<DeliveryOutcome>,
    /// Items not processed because cancellation was requested
    pub cancelled_remaining: usize,
}

/// True when `traffic_data.country` is a string of exactly 3 characters
pub fn is_valid(traffic_data: &Value) -> bool {
    traffic_data
        .get("country")
        .and_then(Value::as_str)
        .is_some_and(|country| country.chars().count() == 3)
}

/// One sink call, with transport failures folded into a status-0 response
///
/// `timeout` bounds the call regardless of what the sink does internally.
pub async fn attempt_delivery(
    sink: &dyn Sink,
    traffic_data: &Value,
    timeout: Option<Duration>,
) -> SinkResponse {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, sink.post(traffic_data)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(limit)),
        },
        None => sink.post(traffic_data).await,
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(sink = sink.name(), error = %e, "sink transport failure");
            SinkResponse::transport_failure(&e)
        }
    }
}

/// Validates work items and delivers them to a [`Sink`]
#[derive(Clone, Debug, Default)]
pub struct DeliveryEngine {
    config: DeliveryConfig,
}

impl DeliveryEngine {
    /// Create an engine with the given settings
    pub fn new(config: DeliveryConfig) -> Self {
        Self { config }
    }

    /// Process every item and return one outcome per item
    pub async fn deliver(&self, items: &[WorkItem], sink: &dyn Sink) -> Vec<DeliveryOutcome> {
        self.deliver_until_cancelled(items, sink, &CancellationToken::new())
            .await
            .outcomes
    }

    /// Process items until done or until `cancel` fires between two items
    pub async fn deliver_until_cancelled(
        &self,
        items: &[WorkItem],
        sink: &dyn Sink,
        cancel: &CancellationToken,
    ) -> DeliveryReport {
        self.deliver_reporting(items, sink, cancel, |_, _| {}).await
    }

    /// Like [`deliver_until_cancelled`](Self::deliver_until_cancelled), calling
    /// `on_outcome` with each item's index and outcome as soon as it is known
    pub async fn deliver_reporting<F>(
        &self,
        items: &[WorkItem],
        sink: &dyn Sink,
        cancel: &CancellationToken,
        mut on_outcome: F,
    ) -> DeliveryReport
    where
        F: FnMut(usize, &DeliveryOutcome),
    {
        let mut outcomes = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = items.len() - index;
                tracing::info!(processed = index, remaining, "delivery cancelled");
                return DeliveryReport {
                    outcomes,
                    cancelled_remaining: remaining,
                };
            }
            let outcome = self.deliver_one(item, sink).await;
            on_outcome(index, &outcome);
            outcomes.push(outcome);
        }

        DeliveryReport {
            outcomes,
            cancelled_remaining: 0,
        }
    }

    /// Run the state machine for a single item
    pub async fn deliver_one(&self, item: &WorkItem, sink: &dyn Sink) -> DeliveryOutcome {
        let traffic_data = item.traffic_data();

        if !is_valid(&traffic_data) {
            return DeliveryOutcome::InvalidData {
                payload: item.payload_value(),
            };
        }

        let mut last = None;
        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            let response =
                attempt_delivery(sink, &traffic_data, self.config.attempt_timeout).await;

            if response.is_success() {
                tracing::debug!(attempt, sink = sink.name(), "traffic data delivered");
                return DeliveryOutcome::Delivered {
                    traffic_data,
                    attempts: attempt,
                };
            }

            if attempt < MAX_DELIVERY_ATTEMPTS {
                tracing::warn!(
                    attempt,
                    status = response.status,
                    message = response.message().unwrap_or(UNKNOWN_ERROR_MESSAGE),
                    "delivery attempt failed, retrying"
                );
            }
            last = Some(response);
        }

        let (status, message) = match &last {
            Some(response) => (
                response.status,
                response
                    .message()
                    .unwrap_or(UNKNOWN_ERROR_MESSAGE)
                    .to_string(),
            ),
            None => (0, UNKNOWN_ERROR_MESSAGE.to_string()),
        };

        DeliveryOutcome::DeliveryFailed {
            message,
            status,
            traffic_data,
        }
    }
}
