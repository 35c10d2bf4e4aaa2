use std::time::Duration;

use chrono::{TimeZone, Utc};
use cvewatch_core::feed::{FeedSettings, FeedSource, FetchOutcome, NvdClient, QueryWindow};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> FeedSettings {
    FeedSettings {
        base_url: format!("{}/rest/json/cves/2.0", server.uri()),
        backoff_base: Duration::from_millis(1),
        ..FeedSettings::new("test-key")
    }
}

fn window() -> QueryWindow {
    QueryWindow::primary(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap())
}

#[tokio::test]
async fn sends_window_page_size_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/json/cves/2.0"))
        .and(query_param("pubStartDate", "2024-01-02T11:55:00Z"))
        .and(query_param("pubEndDate", "2024-01-02T12:00:00Z"))
        .and(query_param("resultsPerPage", "500"))
        .and(header("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vulnerabilities": [
                { "cve": { "id": "CVE-2024-0002", "published": "2024-01-02T11:58:00.000" } },
                { "cve": { "id": "CVE-2024-0001", "published": "2024-01-02T11:56:00.000" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = NvdClient::new(settings(&server)).unwrap();
    match client.fetch(window()).await {
        FetchOutcome::Success(batch) => {
            let ids: Vec<_> = batch.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, ["CVE-2024-0002", "CVE-2024-0001"]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn custom_user_agent_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "cvewatch-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vulnerabilities": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = NvdClient::new(FeedSettings {
        user_agent: "cvewatch-test/1.0".to_string(),
        ..settings(&server)
    })
    .unwrap();
    assert_eq!(client.fetch(window()).await, FetchOutcome::Success(vec![]));
}

#[tokio::test]
async fn forbidden_is_retried_exactly_up_to_the_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(3)
        .mount(&server)
        .await;

    let client = NvdClient::new(settings(&server)).unwrap();
    assert_eq!(
        client.fetch(window()).await,
        FetchOutcome::RateLimited { attempts: 3 }
    );
    // `expect(3)` is verified when the server drops.
}

#[tokio::test]
async fn forbidden_then_ok_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vulnerabilities": [{ "cve": { "id": "CVE-2024-0003" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = NvdClient::new(settings(&server)).unwrap();
    match client.fetch(window()).await {
        FetchOutcome::Success(batch) => assert_eq!(batch[0].id, "CVE-2024-0003"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn timeouts_are_transient_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({ "vulnerabilities": [] })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = NvdClient::new(FeedSettings {
        retries: 2,
        request_timeout: Duration::from_millis(50),
        ..settings(&server)
    })
    .unwrap();
    assert_eq!(
        client.fetch(window()).await,
        FetchOutcome::Transient { attempts: 2 }
    );
}

#[tokio::test]
async fn other_status_is_fatal_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = NvdClient::new(settings(&server)).unwrap();
    assert!(matches!(
        client.fetch(window()).await,
        FetchOutcome::Fatal { .. }
    ));
}

#[tokio::test]
async fn unparseable_body_is_fatal_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = NvdClient::new(settings(&server)).unwrap();
    match client.fetch(window()).await {
        FetchOutcome::Fatal { reason } => assert!(reason.contains("invalid response body")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn connection_error_is_fatal() {
    // Port 9 (discard) is closed on test hosts; the connect is refused.
    let client = NvdClient::new(FeedSettings {
        base_url: "http://127.0.0.1:9/rest/json/cves/2.0".to_string(),
        backoff_base: Duration::from_millis(1),
        ..FeedSettings::new("k")
    })
    .unwrap();
    assert!(matches!(
        client.fetch(window()).await,
        FetchOutcome::Fatal { .. }
    ));
}
