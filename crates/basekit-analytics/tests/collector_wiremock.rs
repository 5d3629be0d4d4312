//! Integration tests for collector delivery using wiremock

use basekit_analytics::{AnalyticsSink, HttpCollector, PageViewEvent, PageViewTracker, TrackerConfig};
use basekit_egress::{HttpClientConfig, RemoteClient, RemoteConfig};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, method, path},
};

fn collector(server: &MockServer) -> HttpCollector {
    let remote = RemoteClient::new(RemoteConfig::new(format!("{}/events", server.uri()))).unwrap();
    HttpCollector::new(remote)
}

#[tokio::test]
async fn test_each_event_is_posted_as_one_document() {
    let mock_server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let timestamp = Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap();

    Mock::given(method("POST"))
        .and(path("/events"))
        .and(body_json(json!({
            "path": "/pricing",
            "timestamp": "2026-05-04T10:30:00Z",
            "sessionId": session_id.to_string()
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .and(body_json(json!({
            "path": "/signup",
            "timestamp": "2026-05-04T10:30:00Z",
            "sessionId": session_id.to_string()
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = vec![
        PageViewEvent::new("/pricing", timestamp, session_id),
        PageViewEvent::new("/signup", timestamp, session_id),
    ];

    collector(&mock_server).send_batch(&events).await.unwrap();
}

#[tokio::test]
async fn test_failed_event_reports_how_much_of_the_batch_was_delivered() {
    let mock_server = MockServer::start().await;
    let session_id = Uuid::new_v4();
    let timestamp = Utc.with_ymd_and_hms(2026, 5, 4, 10, 30, 0).unwrap();

    Mock::given(method("POST"))
        .and(path("/events"))
        .and(body_partial_json(json!({"path": "/home"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .and(body_partial_json(json!({"path": "/docs"})))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .and(body_partial_json(json!({"path": "/blog"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&mock_server)
        .await;

    let events: Vec<_> = ["/home", "/docs", "/blog"]
        .into_iter()
        .map(|page| PageViewEvent::new(page, timestamp, session_id))
        .collect();

    let err = collector(&mock_server).send_batch(&events).await.unwrap_err();

    assert_eq!(err.delivered, 1);
    assert_eq!(err.source.status_code(), Some(503));
}

#[tokio::test]
async fn test_collector_error_is_reported_to_worker_not_caller() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let tracker = PageViewTracker::new(
        Arc::new(collector(&mock_server)),
        TrackerConfig {
            batch_size: 1,
            flush_interval_ms: 60_000,
            channel_buffer_size: 8,
        },
    );

    assert!(tracker.on_navigate("/"));
    assert!(tracker.on_navigate("/about"));
    tracker.shutdown().await;
}

#[tokio::test]
async fn test_slow_collector_does_not_block_navigation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let remote = RemoteClient::new(
        RemoteConfig::new(format!("{}/events", mock_server.uri())).with_client_config(HttpClientConfig {
            timeout_secs: 1,
            ..HttpClientConfig::default()
        }),
    )
    .unwrap();
    let tracker = PageViewTracker::new(
        Arc::new(HttpCollector::new(remote)),
        TrackerConfig {
            batch_size: 1,
            flush_interval_ms: 60_000,
            channel_buffer_size: 8,
        },
    );

    let started = std::time::Instant::now();
    for page in ["/a", "/b", "/c"] {
        assert!(tracker.on_navigate(page));
    }
    assert!(started.elapsed() < Duration::from_millis(100));

    tracker.shutdown().await;
}
