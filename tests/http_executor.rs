use loadpool::config::RunConfig;
use loadpool::{Error, HttpExecutor, OperationExecutor};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, counter: Option<&str>) -> RunConfig {
    serde_json::from_value(json!({
        "name": "http-test",
        "target": {
            "id": "clip-9",
            "action_url": format!("{}/watch", server.uri()),
            "counter_url": counter.map(|p| format!("{}{}", server.uri(), p)),
            "counter_pointer": "/clip/view_count"
        },
        "workers": 1,
        "operations_per_worker": 1,
        "request_timeout_secs": 2
    }))
    .unwrap()
}

fn executor(cfg: &RunConfig) -> HttpExecutor {
    HttpExecutor::from_config(cfg)
        .unwrap()
        .with_counter_retry(3, Duration::from_millis(10))
}

#[tokio::test]
async fn action_succeeds_on_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server, None);
    executor(&cfg).perform_action(&cfg.target.action_url).await.unwrap();
}

#[tokio::test]
async fn action_fails_on_non_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/watch"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let cfg = config(&server, None);
    let err = executor(&cfg).perform_action(&cfg.target.action_url).await.unwrap_err();
    assert!(matches!(err, Error::Status(_)));
    assert_eq!(err.short_description(), "HTTP 429");
}

#[tokio::test]
async fn counter_is_read_with_target_substitution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/clips/clip-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "clip": { "view_count": 4321 } })))
        .mount(&server)
        .await;

    let cfg = config(&server, Some("/api/clips/{target}"));
    let value = executor(&cfg).read_counter(&cfg.target.id).await.unwrap();
    assert_eq!(value, 4321);
}

#[tokio::test]
async fn counter_read_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/clips/clip-9"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/clips/clip-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "clip": { "view_count": 77 } })))
        .with_priority(2)
        .mount(&server)
        .await;

    let cfg = config(&server, Some("/api/clips/{target}"));
    assert_eq!(executor(&cfg).read_counter(&cfg.target.id).await.unwrap(), 77);
}

#[tokio::test]
async fn counter_read_gives_up_after_bounded_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/clips/clip-9"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let cfg = config(&server, Some("/api/clips/{target}"));
    let err = executor(&cfg).read_counter(&cfg.target.id).await.unwrap_err();
    assert!(matches!(err, Error::Status(_)));
}

#[tokio::test]
async fn counter_without_endpoint_is_unavailable() {
    let server = MockServer::start().await;
    let cfg = config(&server, None);
    let exec = executor(&cfg);
    assert!(matches!(exec.read_counter(&cfg.target.id).await, Err(Error::Counter(_))));
    assert_eq!(exec.proxies_available(), 0);
}
