//! End-to-end tests for `GET /metrics`
//!
//! Scrape targets are `wiremock` servers; requests go through the full router
//! (request id, trace and timeout layers).

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{scrapeable_pod, up_line};
use metrics_k8s_proxy::discovery::{EventSink, SCRAPE_ANNOTATION, WorkloadInstance};
use metrics_k8s_proxy::handlers::{AppState, router};
use metrics_k8s_proxy::metrics::ScrapeOutcome;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn target(status: u16, body: &str, delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats/prometheus"))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

async fn get_metrics(state: AppState) -> (StatusCode, Option<String>, String) {
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_two_healthy_targets_are_merged_and_labelled() {
    let a = target(200, "# TYPE requests counter\nrequests 1\n", Duration::ZERO).await;
    let b = target(200, "requests{code=\"200\"} 7\n", Duration::ZERO).await;

    let upstreams = HashMap::from([
        ("10.0.0.1".to_string(), a.uri()),
        ("10.0.0.2".to_string(), b.uri()),
    ]);
    let state = common::state(Duration::from_secs(2), upstreams);
    state
        .registry()
        .upsert(&scrapeable_pod("ztunnel-a", "istio-system", "10.0.0.1"))
        .await;
    state
        .registry()
        .upsert(&scrapeable_pod("ztunnel-b", "istio-system", "10.0.0.2"))
        .await;

    let (status, content_type, body) = get_metrics(state.clone()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert!(body.contains("# TYPE requests counter"));
    assert!(body.contains(
        "requests{k8s_pod_name=\"ztunnel-a\",k8s_namespace=\"istio-system\"} 1"
    ));
    assert!(body.contains(
        "requests{k8s_pod_name=\"ztunnel-b\",k8s_namespace=\"istio-system\",code=\"200\"} 7"
    ));
    assert!(body.contains(&up_line("ztunnel-a", "istio-system", 1)));
    assert!(body.contains(&up_line("ztunnel-b", "istio-system", 1)));
    assert_eq!(state.metrics().scrape_count(ScrapeOutcome::Success), 2);
}

#[tokio::test]
async fn test_failing_target_reports_down_without_failing_request() {
    let healthy = target(200, "requests 1\n", Duration::ZERO).await;
    let broken = target(500, "boom", Duration::ZERO).await;

    let upstreams = HashMap::from([
        ("10.0.0.1".to_string(), healthy.uri()),
        ("10.0.0.2".to_string(), broken.uri()),
    ]);
    let state = common::state(Duration::from_secs(2), upstreams);
    state
        .registry()
        .upsert(&scrapeable_pod("healthy", "default", "10.0.0.1"))
        .await;
    state
        .registry()
        .upsert(&scrapeable_pod("broken", "default", "10.0.0.2"))
        .await;

    let (status, _, body) = get_metrics(state.clone()).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&up_line("healthy", "default", 1)));
    assert!(body.contains(&up_line("broken", "default", 0)));
    assert!(!body.contains("boom"));
    assert_eq!(state.metrics().scrape_count(ScrapeOutcome::Failure), 1);
}

#[tokio::test]
async fn test_slow_target_is_bounded_by_scrape_timeout() {
    let fast = target(200, "requests 1\n", Duration::ZERO).await;
    let slow = target(200, "requests 2\n", Duration::from_secs(5)).await;

    let upstreams = HashMap::from([
        ("10.0.0.1".to_string(), fast.uri()),
        ("10.0.0.2".to_string(), slow.uri()),
    ]);
    let state = common::state(Duration::from_millis(300), upstreams);
    state
        .registry()
        .upsert(&scrapeable_pod("fast", "default", "10.0.0.1"))
        .await;
    state
        .registry()
        .upsert(&scrapeable_pod("slow", "default", "10.0.0.2"))
        .await;

    let started = Instant::now();
    let (status, _, body) = get_metrics(state).await;
    let elapsed = started.elapsed();

    assert_eq!(status, StatusCode::OK);
    assert!(
        elapsed < Duration::from_secs(3),
        "aggregation should end near the deadline, took {:?}",
        elapsed
    );
    assert!(body.contains(&up_line("fast", "default", 1)));
    assert!(body.contains(&up_line("slow", "default", 0)));
    assert!(!body.contains("requests{k8s_pod_name=\"slow\""));
}

#[tokio::test]
async fn test_empty_registry_returns_empty_body() {
    let state = common::state(Duration::from_secs(1), HashMap::new());

    let (status, content_type, body) = get_metrics(state).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_unannotated_and_deleted_pods_are_not_scraped() {
    let server = target(200, "requests 1\n", Duration::ZERO).await;
    let upstreams = HashMap::from([
        ("10.0.0.1".to_string(), server.uri()),
        ("10.0.0.2".to_string(), server.uri()),
    ]);
    let state = common::state(Duration::from_secs(2), upstreams);

    let opted_out = WorkloadInstance::new("opted-out", "default", "10.0.0.1")
        .with_annotation(SCRAPE_ANNOTATION, "false");
    state.registry().upsert(&opted_out).await;

    state
        .registry()
        .upsert(&scrapeable_pod("gone", "default", "10.0.0.2"))
        .await;
    state.registry().remove("10.0.0.2").await;

    let (status, _, body) = get_metrics(state).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_health_reflects_registry_size() {
    let state = common::state(Duration::from_secs(1), HashMap::new());
    state
        .registry()
        .upsert(&scrapeable_pod("a", "default", "10.0.0.1"))
        .await;

    let response = router(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"status": "OK", "targets": 1}));
}

#[tokio::test]
async fn test_self_metrics_count_aggregations() {
    let server = target(200, "requests 1\n", Duration::ZERO).await;
    let upstreams = HashMap::from([("10.0.0.1".to_string(), server.uri())]);
    let state = common::state(Duration::from_secs(2), upstreams);
    state
        .registry()
        .upsert(&scrapeable_pod("a", "default", "10.0.0.1"))
        .await;

    get_metrics(state.clone()).await;
    get_metrics(state.clone()).await;

    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/proxy/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("metrics_proxy_aggregations_total 2"));
    assert!(text.contains("metrics_proxy_targets 1"));
    assert!(text.contains("metrics_proxy_scrapes_total{outcome=\"success\"} 2"));
}
