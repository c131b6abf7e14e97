#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Utc;
use serde_json::json;
use weatherwatch_core::{AppError, Config, NetworkError};
use weatherwatch_monitor::{build_monitor, SqliteStorage, Storage, ThresholdKind};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, db: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.locations = vec!["Delhi".to_string(), "Atlantis".to_string()];
    config.api.api_key = "test_key".to_string();
    config.api.base_url = server.uri();
    config.api.timeout_seconds = 5;
    config.alerts.high_temperature = 40.0;
    config.alerts.consecutive_updates = 1;
    config.polling.max_retries = 1;
    config.polling.request_spacing_ms = 0;
    config.polling.forecast_days = 1;
    config.storage.database_path = Some(db.to_path_buf());
    config.notifier.webhook_url = Some(format!("{}/alerts", server.uri()));
    config
}

async fn mount_upstream(server: &MockServer, now: i64) {
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Delhi"))
        .and(query_param("appid", "test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "weather": [{"main": "Haze"}],
            "main": {"temp": 43.2, "feels_like": 46.0, "humidity": 18},
            "wind": {"speed": 2.6},
            "dt": now - 600
        })))
        .expect(1)
        .mount(server)
        .await;

    let list: Vec<serde_json::Value> = (0..8)
        .map(|i| {
            json!({
                "dt": now + i * 10_800,
                "main": {"temp": 38.0 + i as f64 * 0.5, "humidity": 20},
                "weather": [{"main": "Clear"}],
                "wind": {"speed": 3.0}
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("q", "Delhi"))
        .and(query_param("cnt", "8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "list": list })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("q", "Atlantis"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "cod": "404",
            "message": "city not found"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/alerts"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_cycle_against_mock_upstream() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("weather.db");
    mount_upstream(&server, Utc::now().timestamp()).await;

    let mut monitor = build_monitor(&config(&server, &db)).unwrap();

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.fetched, vec!["Delhi"]);
    assert_eq!(report.failed, vec!["Atlantis"]);
    assert_eq!(report.observations_stored, 1);
    assert!(report.daily_summaries >= 1);
    assert!(report.forecast_summaries >= 1);
    assert_eq!(report.forecast_failed, vec!["Atlantis"]);
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].kind, ThresholdKind::High);
    assert_eq!(report.alerts[0].temperature, 43.2);

    // Within the TTL: served from the cache, nothing new to alert on
    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.cached, vec!["Delhi"]);
    assert!(report.fetched.is_empty());
    assert!(report.alerts.is_empty());

    drop(monitor);
    let store = SqliteStorage::new(&db).unwrap();
    assert_eq!(store.list_locations().unwrap(), vec!["Delhi"]);
    let summaries = store.daily_summaries("Delhi", None, None).unwrap();
    assert_eq!(summaries.last().unwrap().stats.max_temperature, 43.2);
    let forecast_samples: usize = store
        .forecast_summaries("Delhi")
        .unwrap()
        .iter()
        .map(|s| s.stats.sample_count)
        .sum();
    assert_eq!(forecast_samples, 8);
}

#[tokio::test]
async fn test_cycle_fails_when_every_location_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut monitor = build_monitor(&config(&server, &dir.path().join("weather.db"))).unwrap();
    let err = monitor.run_cycle().await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Network(NetworkError::ServerError { status: 503, .. })
    ));
}
