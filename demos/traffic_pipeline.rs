//! Traffic pipeline example
//!
//! Downloads the public dataset, keeps the latest low-fatality record per country,
//! and relays each one to the sales system API. Press Ctrl+C to stop after the
//! item in flight.

use std::path::PathBuf;
use std::time::Duration;

use traffic_relay::config::{Config, FilterConfig};
use traffic_relay::{DeliveryOutcome, Event, Pipeline, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut config = Config {
        filter: FilterConfig {
            max_rate: 5.0,
            gender: "BTSX".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    config.sink.timeout = Duration::from_secs(10);
    config.output.work_items_path = Some(PathBuf::from("output/work_items.json"));

    let pipeline = Pipeline::new(config)?;

    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::RecordsFetched { count } => {
                    println!("Fetched {} raw records", count);
                }
                Event::RecordSkipped { record } => {
                    println!("Skipped: {}", record);
                }
                Event::BatchEmpty { message } => {
                    println!("{}", message);
                }
                Event::BatchStarted { items } => {
                    println!("Delivering {} work items", items);
                }
                Event::ItemProcessed { index, outcome } => match outcome {
                    DeliveryOutcome::Delivered { traffic_data, .. } => {
                        println!("[{}] delivered {}", index, traffic_data);
                    }
                    DeliveryOutcome::InvalidData { payload } => {
                        println!("[{}] invalid {}", index, payload);
                    }
                    DeliveryOutcome::DeliveryFailed {
                        message, status, ..
                    } => {
                        println!("[{}] failed ({}): {}", index, status, message);
                    }
                },
                Event::BatchCompleted {
                    delivered,
                    invalid,
                    failed,
                    cancelled_remaining,
                } => {
                    println!(
                        "Done: {} delivered, {} invalid, {} failed, {} not attempted",
                        delivered, invalid, failed, cancelled_remaining
                    );
                }
            }
        }
    });

    let report = run_with_shutdown(&pipeline).await?;

    // Dropping the pipeline closes the event channel once the backlog is read
    drop(pipeline);
    printer.await?;

    std::process::exit(report.exit_code());
}
