//! HttpDocumentStore and the fetcher against a mock REST store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use gridcast_core::{CacheConfig, GridConfig, ResolveError};
use gridcast_engine::{
    DocumentStore, FetchOptions, GridIndex, GridKey, HttpDocumentStore, MemorySnapshotStore,
    OfflineCache, ResilientFetcher, ResolutionSource, RetryPolicy, SearchRing, StoreError,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn document(latitude: f64, longitude: f64) -> serde_json::Value {
    json!({
        "latitude": latitude,
        "longitude": longitude,
        "generated_at": "2026-10-17T06:00:00Z",
        "current": {
            "temperature_2m": 24.3,
            "apparent_temperature": 25.1,
            "relative_humidity_2m": 78,
            "wind_speed_10m": 6.4,
            "weather_code": 2
        },
        "hourly": {
            "time": ["2026-10-17T06:00", "2026-10-17T07:00"],
            "temperature_2m": [24.3, 24.9],
            "precipitation_probability": [10, 20],
            "weather_code": [2, 3]
        }
    })
}

fn store(server: &MockServer) -> HttpDocumentStore {
    HttpDocumentStore::new(&server.uri(), "weather", Duration::from_secs(5)).unwrap()
}

fn key(text: &str) -> GridKey {
    text.parse().unwrap()
}

#[tokio::test]
async fn test_get_decodes_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/23.70_92.80"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(23.7, 92.8)))
        .expect(1)
        .mount(&server)
        .await;

    let record = store(&server).get(&key("23.70_92.80")).await.unwrap();

    assert_eq!(record.latitude, 23.7);
    let current = record.payload.current().unwrap();
    assert_eq!(current.temperature, Some(24.3));
    assert_eq!(current.humidity, Some(78.0));
    assert_eq!(record.payload.hourly().unwrap().temperature.len(), 2);
}

#[tokio::test]
async fn test_missing_document_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/23.70_92.80"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = store(&server).get(&key("23.70_92.80")).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_server_errors_are_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/23.70_92.80"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather/23.80_92.80"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let store = store(&server);
    assert!(store.get(&key("23.70_92.80")).await.unwrap_err().is_retryable());
    assert!(store.get(&key("23.80_92.80")).await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_client_errors_are_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/23.70_92.80"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let err = store(&server).get(&key("23.70_92.80")).await.unwrap_err();
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/23.70_92.80"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = store(&server).get(&key("23.70_92.80")).await.unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)));
}

#[tokio::test]
async fn test_unreachable_host_is_transport() {
    // Nothing listens on the discard port
    let store =
        HttpDocumentStore::new("http://127.0.0.1:9", "weather", Duration::from_secs(2)).unwrap();

    let err = store.get(&key("23.70_92.80")).await.unwrap_err();
    assert!(err.is_retryable());
}

fn fetcher(server: &MockServer) -> (ResilientFetcher, Arc<OfflineCache>) {
    let cache = Arc::new(OfflineCache::new(
        MemorySnapshotStore::new(),
        &CacheConfig::default(),
    ));
    let options = FetchOptions {
        retry: RetryPolicy::new(3, 1),
        search_radius_km: 50.0,
    };
    let fetcher = ResilientFetcher::new(
        Arc::new(store(server)),
        Arc::new(GridIndex::build(&GridConfig::default())),
        cache.clone(),
        options,
    )
    .with_rings(vec![SearchRing::new(0.10, 0.05)]);

    (fetcher, cache)
}

#[tokio::test]
async fn test_fetcher_retries_exact_key_then_uses_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/23.70_92.80"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather/23.75_92.80"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(23.75, 92.8)))
        .mount(&server)
        .await;

    let (fetcher, cache) = fetcher(&server);
    let resolution = fetcher.resolve(key("23.70_92.80")).await.unwrap();

    assert_eq!(resolution.key, Some(key("23.75_92.80")));
    assert!(matches!(resolution.source, ResolutionSource::Candidate { .. }));
    assert_eq!(cache.load().unwrap().key, Some(key("23.75_92.80")));
}

#[tokio::test]
async fn test_fetcher_exhausted_when_nothing_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/23.70_92.80"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let (fetcher, cache) = fetcher(&server);
    let err = fetcher.resolve(key("23.70_92.80")).await.unwrap_err();

    assert!(matches!(err, ResolveError::Exhausted { ref key } if key == "23.70_92.80"));
    assert!(cache.load().is_none());
}
