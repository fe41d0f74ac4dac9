//! Pipeline orchestration: produce work items, then consume them
//!
//! [`Pipeline`] owns the configuration, the sink, an event channel and a
//! cancellation token. Logging of per-item outcomes happens here, so the reducer and
//! the delivery engine stay free of presentation concerns.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::delivery::DeliveryEngine;
use crate::error::Result;
use crate::reducer::{Reducer, Reduction};
use crate::retry::with_retry;
use crate::sink::{HttpSink, Sink};
use crate::source::acquire_raw_records;
use crate::types::{BatchReport, DeliveryOutcome, Event, NO_DATA_MESSAGE, WorkItem};
use crate::work_items::save_work_items;

/// Capacity of the event channel; slow subscribers lag rather than block the run
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Produce-then-consume pipeline
pub struct Pipeline {
    config: Config,
    reducer: Reducer,
    engine: DeliveryEngine,
    sink: Arc<dyn Sink>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline that delivers to the HTTP sink described by `config.sink`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) when the configuration does not validate.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let sink = Arc::new(HttpSink::new(&config.sink)?);
        Ok(Self::build(config, sink))
    }

    /// Create a pipeline that delivers to a caller-provided sink
    ///
    /// `config.sink` is ignored; everything else is validated as in [`Pipeline::new`].
    pub fn with_sink(config: Config, sink: Arc<dyn Sink>) -> Result<Self> {
        let mut checked = config.clone();
        checked.sink = Default::default();
        checked.validate()?;
        Ok(Self::build(config, sink))
    }

    fn build(config: Config, sink: Arc<dyn Sink>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            reducer: Reducer::new(config.source.fields.clone(), config.filter.clone()),
            engine: DeliveryEngine::new(config.delivery.clone()),
            config,
            sink,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops delivery between items when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation; the item in flight finishes first
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Acquire raw records, reduce them, and save the snapshot if configured
    ///
    /// Acquisition is retried according to `config.retry`; cancelling the pipeline
    /// stops it, even during a backoff pause, with [`Error::Cancelled`](crate::Error::Cancelled).
    pub async fn produce(&self) -> Result<Reduction> {
        let source = &self.config.source;
        let rows =
            with_retry(&self.config.retry, &self.cancel, || acquire_raw_records(source)).await?;
        self.emit(Event::RecordsFetched { count: rows.len() });

        let reduction = self.reducer.reduce(&rows)?;
        for record in &reduction.malformed {
            self.emit(Event::RecordSkipped {
                record: record.clone(),
            });
        }

        if reduction.is_empty() {
            tracing::info!("{}", NO_DATA_MESSAGE);
            self.emit(Event::BatchEmpty {
                message: NO_DATA_MESSAGE.to_string(),
            });
        } else {
            tracing::info!(
                rows = rows.len(),
                work_items = reduction.work_items.len(),
                "produced work items"
            );
        }

        if let Some(path) = &self.config.output.work_items_path {
            save_work_items(path, &reduction.work_items).await?;
        }

        Ok(reduction)
    }

    /// Deliver work items and report per-item outcomes
    ///
    /// Never fails: invalid data and rejected deliveries are recorded in the report.
    pub async fn consume(&self, items: &[WorkItem]) -> BatchReport {
        let started_at = Utc::now();
        self.emit(Event::BatchStarted { items: items.len() });

        let report = self
            .engine
            .deliver_reporting(items, self.sink.as_ref(), &self.cancel, |index, outcome| {
                log_outcome(index, outcome);
                self.emit(Event::ItemProcessed {
                    index,
                    outcome: outcome.clone(),
                });
            })
            .await;

        let batch =
            BatchReport::from_outcomes(report.outcomes, report.cancelled_remaining, started_at);

        tracing::info!(
            delivered = batch.delivered,
            invalid = batch.invalid,
            failed = batch.failed,
            cancelled_remaining = batch.cancelled_remaining,
            "batch completed"
        );
        self.emit(Event::BatchCompleted {
            delivered: batch.delivered,
            invalid: batch.invalid,
            failed: batch.failed,
            cancelled_remaining: batch.cancelled_remaining,
        });

        batch
    }

    /// Produce, then consume
    ///
    /// # Errors
    ///
    /// Fails only when production fails (unreachable source after retries, unusable
    /// document, aborting malformed record, snapshot I/O) or is cancelled.
    pub async fn run(&self) -> Result<BatchReport> {
        let reduction = self.produce().await?;
        let mut report = self.consume(&reduction.work_items).await;
        report.malformed = reduction.malformed.len();
        Ok(report)
    }

    fn emit(&self, event: Event) {
        // No subscribers is not an error
        self.event_tx.send(event).ok();
    }
}

fn log_outcome(index: usize, outcome: &DeliveryOutcome) {
    let tag = outcome.kind().tag();
    match outcome {
        DeliveryOutcome::Delivered {
            traffic_data,
            attempts,
        } => {
            tracing::debug!(index, attempts, traffic_data = %traffic_data, "{tag}");
        }
        DeliveryOutcome::InvalidData { payload } => {
            tracing::error!(index, payload = %payload, "{tag}");
        }
        DeliveryOutcome::DeliveryFailed {
            message,
            status,
            traffic_data,
        } => {
            tracing::warn!(
                index,
                status,
                message = %message,
                traffic_data = %traffic_data,
                "{tag}"
            );
        }
    }
}
