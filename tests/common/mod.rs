//! Shared fixtures for traffic-relay integration tests

use serde_json::{Value, json};
use traffic_relay::Config;
use wiremock::MockServer;

/// Path the mock sink listens on
pub const SINK_PATH: &str = "/sales-system-api";

/// Path the mock source serves the dataset from
pub const SOURCE_PATH: &str = "/RS_198.json";

/// One raw row in the public dataset's field naming
pub fn raw_row(country: &str, year: i64, rate: f64, gender: &str) -> Value {
    json!({
        "Id": 0,
        "IndicatorCode": "RS_198",
        "SpatialDimType": "COUNTRY",
        "SpatialDim": country,
        "TimeDimType": "YEAR",
        "TimeDim": year,
        "Dim1Type": "SEX",
        "Dim1": gender,
        "NumericValue": rate,
    })
}

/// A small but dirty dataset:
/// - FIN has three years, the newest valid one is 2019
/// - SWE only has rows at or above the threshold
/// - NOR has male/female rows only
/// - "US" is a two-letter code that passes the reducer but fails delivery validation
/// - DNK has two rows for the same year
pub fn sample_document() -> Value {
    json!({
        "@odata.context": "https://ghoapi.azureedge.net/api/$metadata#RS_198",
        "value": [
            raw_row("FIN", 2015, 4.5, "BTSX"),
            raw_row("FIN", 2019, 3.8, "BTSX"),
            raw_row("FIN", 2021, 5.2, "BTSX"),
            raw_row("SWE", 2019, 5.0, "BTSX"),
            raw_row("SWE", 2018, 6.1, "BTSX"),
            raw_row("NOR", 2019, 1.5, "MLE"),
            raw_row("NOR", 2019, 1.1, "FMLE"),
            raw_row("US", 2019, 4.9, "BTSX"),
            raw_row("DNK", 2017, 3.3, "BTSX"),
            raw_row("DNK", 2017, 3.0, "BTSX"),
        ]
    })
}

/// Configuration pointing both source and sink at the mock server, with fast retries
pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.source.url = format!("{}{}", server.uri(), SOURCE_PATH);
    config.sink.url = format!("{}{}", server.uri(), SINK_PATH);
    config.retry.initial_delay = std::time::Duration::from_millis(10);
    config.retry.jitter = false;
    config
}
