//! End-to-end pipeline tests against mock HTTP source and sink servers

mod common;

use std::sync::Arc;

use common::{SINK_PATH, SOURCE_PATH, config_for, raw_row, sample_document};
use serde_json::json;
use traffic_relay::work_items::load_work_items;
use traffic_relay::{DeliveryOutcome, Error, HttpSink, OutcomeKind, Pipeline};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve_source(server: &MockServer, document: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(SOURCE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_run_classifies_every_item() {
    let server = MockServer::start().await;
    serve_source(&server, sample_document()).await;

    // Registered first so it takes precedence over the catch-all below
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .and(body_partial_json(json!({"country": "DNK"})))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"message": "Sales system rejected DNK"})),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "OK"})))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config_for(&server)).unwrap();
    let report = pipeline.run().await.unwrap();

    let kinds: Vec<_> = report.outcomes.iter().map(DeliveryOutcome::kind).collect();
    assert_eq!(
        kinds,
        vec![
            OutcomeKind::Delivered,
            OutcomeKind::InvalidData,
            OutcomeKind::DeliveryFailed
        ]
    );

    assert_eq!(
        report.outcomes[0],
        DeliveryOutcome::Delivered {
            traffic_data: json!({"country": "FIN", "year": 2019, "rate": 3.8}),
            attempts: 1,
        }
    );
    assert_eq!(
        report.outcomes[2],
        DeliveryOutcome::DeliveryFailed {
            message: "Sales system rejected DNK".into(),
            status: 500,
            // First DNK row wins the 2017 tie
            traffic_data: json!({"country": "DNK", "year": 2017, "rate": 3.3}),
        }
    );
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.malformed, 0);
}

#[tokio::test]
async fn transient_source_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SOURCE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    serve_source(
        &server,
        json!({"value": [raw_row("EST", 2019, 4.1, "BTSX")]}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config_for(&server)).unwrap();
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn missing_source_fails_the_run_without_delivering() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SOURCE_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config_for(&server)).unwrap();
    match pipeline.run().await {
        Err(Error::SourceStatus { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected SourceStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn sink_recovering_on_retry_counts_as_delivered() {
    let server = MockServer::start().await;
    serve_source(
        &server,
        json!({"value": [raw_row("LTU", 2020, 3.9, "BTSX")]}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "busy"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = Pipeline::new(config_for(&server)).unwrap();
    let report = pipeline.run().await.unwrap();

    assert!(matches!(
        report.outcomes[0],
        DeliveryOutcome::Delivered { attempts: 2, .. }
    ));
}

#[tokio::test]
async fn produce_and_consume_hand_off_through_a_file() {
    let server = MockServer::start().await;
    serve_source(&server, sample_document()).await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("work_items.json");
    let mut config = config_for(&server);
    config.output.work_items_path = Some(snapshot.clone());

    let producer = Pipeline::new(config.clone()).unwrap();
    let reduction = producer.produce().await.unwrap();
    assert_eq!(reduction.work_items.len(), 3);

    // A separate consumer picks the file up later
    let consumer = Pipeline::new(config).unwrap();
    let items = load_work_items(&snapshot).await.unwrap();
    let report = consumer.consume(&items).await;

    assert_eq!(report.delivered, 2);
    assert_eq!(report.invalid, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn unreachable_sink_fails_items_with_status_zero() {
    let server = MockServer::start().await;
    serve_source(
        &server,
        json!({"value": [raw_row("LVA", 2019, 4.4, "BTSX")]}),
    )
    .await;

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = config_for(&server);
    config.sink.url = format!("http://{addr}{SINK_PATH}");
    let sink = Arc::new(HttpSink::new(&config.sink).unwrap());
    let pipeline = Pipeline::with_sink(config, sink).unwrap();

    let report = pipeline.run().await.unwrap();

    match &report.outcomes[0] {
        DeliveryOutcome::DeliveryFailed { status, .. } => assert_eq!(*status, 0),
        other => panic!("expected DeliveryFailed, got {other:?}"),
    }
    assert_eq!(report.exit_code(), 1);
}
