//! # traffic-relay
//!
//! Batch pipeline that downloads per-country traffic-fatality statistics, keeps the
//! most recent valid record per country, and relays each one to an HTTP sink.
//!
//! ## Design Philosophy
//!
//! - **Two pure-ish cores** - the [`Reducer`] selects one record per country, the
//!   [`DeliveryEngine`] validates, posts and retries once
//! - **Injected sinks** - delivery goes through the [`Sink`] trait, so tests and
//!   embedders can swap the HTTP endpoint for anything else
//! - **Outcomes, not exceptions** - business and application errors are returned per
//!   item; only contract violations fail a call
//! - **Library-first** - no CLI; [`BatchReport::exit_code`] tells a wrapper what to
//!   return
//!
//! ## Quick Start
//!
//! ```no_run
//! use traffic_relay::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(Config::default())?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = pipeline.run().await?;
//!     std::process::exit(report.exit_code());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Delivery engine with bounded retry
pub mod delivery;
/// Error types
pub mod error;
/// Pipeline orchestration
pub mod pipeline;
/// Reduction to one record per country
pub mod reducer;
/// Retry logic with exponential backoff
pub mod retry;
/// Delivery sinks
pub mod sink;
/// Raw record acquisition
pub mod source;
/// Core types and events
pub mod types;
/// Work item file persistence
pub mod work_items;

// Re-export commonly used types
pub use config::{Config, FieldMapping, FilterConfig, MalformedPolicy};
pub use delivery::{DeliveryEngine, DeliveryReport, is_valid};
pub use error::{Error, MalformedRecord, Result};
pub use pipeline::Pipeline;
pub use reducer::{Reducer, Reduction};
pub use sink::{HttpSink, Sink, SinkResponse, TransportError};
pub use types::{
    BatchReport, DeliveryOutcome, Event, OutcomeKind, RawRecord, TrafficData, WorkItem,
};

/// Run the pipeline, cancelling it when a termination signal arrives.
///
/// On a signal, delivery stops after the item in flight and the report lists how many
/// items were left unprocessed. If the signal arrives while records are still being
/// fetched, the run fails with [`Error::Cancelled`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use traffic_relay::{Config, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default())?;
///     let report = run_with_shutdown(&pipeline).await?;
///     std::process::exit(report.exit_code());
/// }
/// ```
pub async fn run_with_shutdown(pipeline: &Pipeline) -> Result<BatchReport> {
    let cancel = pipeline.cancellation_token();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => cancel.cancel(),
            _ = cancel.cancelled() => {}
        }
    });

    let result = pipeline.run().await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
