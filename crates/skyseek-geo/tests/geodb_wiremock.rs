//! GeoDbClient tests against a mock GeoDB server.

#![allow(clippy::unwrap_used)]

use std::time::{Duration, Instant};

use skyseek_core::GeoConfig;
use skyseek_geo::{GeoApi, GeoDbClient, GeoError};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> GeoDbClient {
    GeoDbClient::new(GeoConfig {
        base_url: base_url.to_string(),
        api_key: "test_key".to_string(),
        api_host: "geo.test".to_string(),
        min_request_spacing_ms: 0,
        default_cooldown_ms: 300,
        max_cooldown_ms: 2500,
        ..GeoConfig::default()
    })
    .unwrap()
}

fn city(id: i64, name: &str, country: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "country": country,
        "countryCode": "XX",
        "latitude": 1.5,
        "longitude": 2.5,
        "population": 50000
    })
}

#[tokio::test]
async fn test_prefix_cities_sends_headers_and_params() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .and(header("X-RapidAPI-Key", "test_key"))
        .and(header("X-RapidAPI-Host", "geo.test"))
        .and(query_param("namePrefix", "Jakarta"))
        .and(query_param("limit", "10"))
        .and(query_param("minPopulation", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [city(1, "Jakarta", "Indonesia")],
            "metadata": {"currentOffset": 0, "totalCount": 1}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let cities = client
        .prefix_cities("Jakarta", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cities.len(), 1);
    assert_eq!(cities[0].name, "Jakarta");
    assert_eq!(cities[0].latitude, Some(1.5));
}

#[tokio::test]
async fn test_exact_cities_filters_and_caps() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .and(query_param("minPopulation", "10000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                city(1, "Paris", "France"),
                city(2, "Le Paris Nouveau", "France"),
                city(3, "Paris", "United States"),
                city(4, "Parisot", "France"),
                city(5, "paris", "Canada"),
                city(6, "Paris Hill", "Canada"),
                city(7, "Paris Creek", "Australia"),
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let cities = client
        .exact_cities("paris", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cities.len(), 5);
    assert!(cities.iter().all(|c| c.name.to_lowercase().starts_with("paris")));
    assert!(!cities.iter().any(|c| c.id == 2));
}

#[tokio::test]
async fn test_exact_countries_caps_at_three() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/countries"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"code": "GN", "name": "Guinea", "capital": "Conakry"},
                {"code": "GW", "name": "Guinea-Bissau"},
                {"code": "GQ", "name": "Guinea Ecuatorial"},
                {"code": "PG", "name": "Papua New Guinea"},
                {"code": "XG", "name": "Guineaville"}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let countries = client
        .exact_countries("guinea", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(countries.len(), 3);
    assert_eq!(countries[0].capital.as_deref(), Some("Conakry"));
    assert!(!countries.iter().any(|c| c.code == "PG"));
}

#[tokio::test]
async fn test_prefix_countries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/countries"))
        .and(query_param("namePrefix", "Fra"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"code": "FR", "name": "France", "capital": "Paris"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let countries = client
        .prefix_countries("Fra", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(countries[0].code, "FR");
}

#[tokio::test]
async fn test_rate_limited_uses_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "2"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let result = client
        .prefix_cities("Lon", &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(GeoError::RateLimited { retry_after_ms: 2000 })
    ));
    assert!(client.cooldown_remaining() > Duration::from_millis(1500));
}

#[tokio::test]
async fn test_rate_limit_hint_is_capped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/countries"))
        .respond_with(
            ResponseTemplate::new(429).append_header("X-RateLimit-Requests-Reset", "3600"),
        )
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let result = client
        .prefix_countries("Lon", &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(GeoError::RateLimited { retry_after_ms: 2500 })
    ));
}

#[tokio::test]
async fn test_huge_retry_after_is_capped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "1e30"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let result = client
        .exact_cities("Lon", &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(GeoError::RateLimited { retry_after_ms: 2500 })
    ));
    assert!(client.cooldown_remaining() <= Duration::from_millis(2500));
}

#[tokio::test]
async fn test_cooldown_delays_next_call_of_any_family() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/countries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let cancel = CancellationToken::new();

    let first = client.prefix_cities("Lon", &cancel).await;
    assert!(matches!(first, Err(GeoError::RateLimited { retry_after_ms: 300 })));

    let started = Instant::now();
    let countries = client.prefix_countries("Lon", &cancel).await.unwrap();
    assert!(countries.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[tokio::test]
async fn test_server_error_is_network_error_with_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let result = client
        .prefix_cities("Lon", &CancellationToken::new())
        .await;

    match result {
        Err(GeoError::Network(e)) => assert_eq!(e.status(), Some(503)),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": [{"code": "X", "message": "unexpected"}]
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let result = client
        .prefix_cities("Lon", &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(GeoError::Parse(_))));
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cities"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"data": []}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server.uri());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = client.prefix_cities("Lon", &cancel).await;
    assert!(matches!(result, Err(GeoError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
}
