#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use serde_json::json;
use weatherwatch_core::NetworkError;
use weatherwatch_weather::{
    Condition, FetchFailure, FetchOutcome, FetchSettings, HttpNetwork, ResilientFetcher,
    RetryConfig,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(base_url: String) -> FetchSettings {
    FetchSettings {
        api_key: "test_key".to_string(),
        base_url,
        timeout: Duration::from_secs(5),
        retry: RetryConfig::new(3, 10, 100).without_jitter(),
        request_spacing: Duration::from_millis(5),
        max_concurrent: 4,
        cache_ttl: Duration::from_secs(300),
    }
}

fn current_body(temp: f64, condition: &str) -> serde_json::Value {
    json!({
        "coord": {"lon": 77.2, "lat": 28.6},
        "weather": [{"id": 800, "main": condition, "description": "clear sky"}],
        "main": {"temp": temp, "feels_like": temp + 1.0, "humidity": 20},
        "wind": {"speed": 3.1},
        "dt": 1714550400,
        "name": "Delhi"
    })
}

#[tokio::test]
async fn test_fetch_current_against_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Delhi"))
        .and(query_param("appid", "test_key"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body(41.0, "Haze")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = ResilientFetcher::new(HttpNetwork::new().unwrap(), settings(mock_server.uri()));
    let locations = vec!["Delhi".to_string()];

    let observations = fetcher.fetch_current(&locations).await;
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].temperature, 41.0);
    assert_eq!(observations[0].feels_like, 42.0);
    assert_eq!(observations[0].condition, Condition::Haze);

    // Second call is served from the cache; the mock expects a single hit
    let again = fetcher.fetch_current_outcomes(&locations).await;
    assert!(matches!(again[0].1, FetchOutcome::CacheHit(_)));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body(30.0, "Clear")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = ResilientFetcher::new(HttpNetwork::new().unwrap(), settings(mock_server.uri()));
    let outcomes = fetcher
        .fetch_current_outcomes(&["Delhi".to_string()])
        .await;

    assert!(matches!(outcomes[0].1, FetchOutcome::Fetched(_)));
}

#[tokio::test]
async fn test_one_failing_location_does_not_sink_the_batch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Atlantis"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "cod": "404",
            "message": "city not found"
        })))
        .expect(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Mumbai"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body(29.0, "Rain")))
        .mount(&mock_server)
        .await;

    let fetcher = ResilientFetcher::new(HttpNetwork::new().unwrap(), settings(mock_server.uri()));
    let outcomes = fetcher
        .fetch_current_outcomes(&["Atlantis".to_string(), "Mumbai".to_string()])
        .await;

    match &outcomes[0].1 {
        FetchOutcome::Failed(FetchFailure::Exhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(*attempts, 3);
            assert!(matches!(last_error, NetworkError::ServerError { status: 404, .. }));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(matches!(outcomes[1].1, FetchOutcome::Fetched(_)));
}

#[tokio::test]
async fn test_fetch_forecast_against_http() {
    let mock_server = MockServer::start().await;

    let list: Vec<serde_json::Value> = (0..8)
        .map(|i| {
            json!({
                "dt": 1714521600 + i * 10800,
                "main": {"temp": 30.0 + i as f64, "humidity": 30},
                "weather": [{"main": "Clear"}],
                "wind": {"speed": 2.0}
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("q", "Delhi"))
        .and(query_param("cnt", "8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cod": "200",
            "cnt": 8,
            "list": list
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = ResilientFetcher::new(HttpNetwork::new().unwrap(), settings(mock_server.uri()));
    let forecasts = fetcher.fetch_forecast(&["Delhi".to_string()], 1).await;

    assert_eq!(forecasts["Delhi"].len(), 8);
    assert_eq!(forecasts["Delhi"][7].temperature, 37.0);
}
