// Integration tests for the HTTP adapters against a mock API server

use std::sync::Arc;
use std::time::Duration;

use folio_pulse::{
    ActivityLogQuery, ActivityLogSource, ActivitySource, ActivityType, ApiClient,
    DashboardSource, EventStreamClient, HealthProbe, HealthProbePool, HttpHealthProbe,
    PageRequest, ProbeConfig, ServiceDescriptor, SourceError, StreamConfig, StreamMode,
};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn event(id: &str, kind: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": kind,
        "action": format!("{} happened", kind),
        "timestamp": "2024-05-01T10:00:00Z",
        "userId": "admin"
    })
}

#[tokio::test]
async fn test_fetch_recent_sends_limit_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activities/recent"))
        .and(query_param("limit", "5"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activities": [event("e2", "LOGIN"), event("e1", "PROJECT_CREATED")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri()).with_token("secret");
    let events = client.fetch_recent(5).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id.as_str(), "e2");
    assert_eq!(events[0].event_type, ActivityType::Login);
    assert_eq!(events[1].event_type, ActivityType::ProjectCreated);
    assert_eq!(events[0].user_id.as_deref(), Some("admin"));
}

#[tokio::test]
async fn test_fetch_recent_accepts_bare_array_and_unknown_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activities/recent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([event("e9", "CACHE_WARMED"), event("e8", "LOGOUT")])),
        )
        .mount(&server)
        .await;

    let events = ApiClient::new(&server.uri()).fetch_recent(20).await.unwrap();

    assert_eq!(events[0].event_type, ActivityType::Other("CACHE_WARMED".into()));
    assert_eq!(events[1].event_type, ActivityType::Logout);
}

#[tokio::test]
async fn test_fetch_page_sends_type_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activities"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "10"))
        .and(query_param("type", "BLOG_CREATED"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activities": [event("b1", "BLOG_CREATED")],
            "pagination": { "page": 2, "totalPages": 4, "total": 31 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri());
    let page = client
        .fetch_page(&PageRequest {
            page: 2,
            limit: 10,
            event_type: Some(ActivityType::BlogCreated),
        })
        .await
        .unwrap();

    assert_eq!(page.total_pages(), 4);
    assert_eq!(page.pagination.total, Some(31));
    assert_eq!(page.activities[0].id.as_str(), "b1");
}

#[tokio::test]
async fn test_activity_log_query_keeps_page_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activities"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activities": [event("a1", "LOGIN"), event("a2", "ROLE_UPDATED")],
            "pagination": { "totalPages": 2 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/activities"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
        .mount(&server)
        .await;

    let mut query = ActivityLogQuery::new(Arc::new(ApiClient::new(&server.uri())));
    query.reload().await.unwrap();
    assert_eq!(query.items().len(), 2);

    query.set_search_term("role");
    assert_eq!(query.visible_items().len(), 1);

    assert!(query.next_page());
    let err = query.reload().await.unwrap_err();
    assert!(err.to_string().contains("database unavailable"));
    assert_eq!(query.items().len(), 2);
    assert!(query.last_error().is_some());
}

#[tokio::test]
async fn test_counts_accept_every_shape() {
    let server = MockServer::start().await;
    for (route, body) in [
        ("/api/users/count", json!(12)),
        ("/api/projects/count", json!({ "count": 5 })),
        ("/api/blogs/count", json!({ "total": 9 })),
        ("/api/messages/count", json!({ "count": 0 })),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/analytics/weekly-visits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "visits": [{ "day": "Mon", "visits": 40 }, { "label": "Tue", "count": 52 }]
        })))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri());
    assert_eq!(client.user_count().await.unwrap(), 12);
    assert_eq!(client.project_count().await.unwrap(), 5);
    assert_eq!(client.blog_post_count().await.unwrap(), 9);
    assert_eq!(client.message_count().await.unwrap(), 0);

    let visits = client.weekly_visits().await.unwrap();
    assert_eq!(visits[0].label, "Mon");
    assert_eq!(visits[1].count, 52);
}

#[tokio::test]
async fn test_api_error_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/count"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = ApiClient::new(&server.uri()).user_count().await.unwrap_err();
    match err {
        SourceError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Forbidden");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_slow_api_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/count"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!(1))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client =
        ApiClient::new(&server.uri()).with_request_timeout(Duration::from_millis(100));
    let err = client.project_count().await.unwrap_err();
    assert!(err.is_timeout());
}

// ============================================================================
// Push channel
// ============================================================================

fn sse_body(payloads: &[serde_json::Value]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {}\n\n", p))
        .collect()
}

#[tokio::test]
async fn test_open_channel_decodes_single_and_batch_payloads() {
    let server = MockServer::start().await;
    let body = format!(
        ": keep-alive\n\n{}",
        sse_body(&[
            event("e3", "MESSAGE_RECEIVED"),
            json!([event("e5", "LOGIN"), event("e4", "LOGOUT")]),
        ])
    );
    Mock::given(method("GET"))
        .and(path("/api/activities/stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri()).with_stream_mode(StreamMode::Sse);
    let stream = client.open_channel().await.unwrap().expect("push channel");
    let batches: Vec<_> = stream.map(|b| b.unwrap()).collect().await;

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0][0].id.as_str(), "e3");
    let ids: Vec<_> = batches[1].iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e5", "e4"]);
}

#[tokio::test]
async fn test_poll_mode_has_no_channel() {
    let client = ApiClient::new("http://127.0.0.1:1");
    assert!(client.open_channel().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stream_client_over_sse() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activities/recent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([event("e1", "LOGIN")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/activities/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[json!([event("e3", "BLOG_UPDATED"), event("e2", "LOGIN")])]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let api = Arc::new(ApiClient::new(&server.uri()).with_stream_mode(StreamMode::Sse));
    let client = EventStreamClient::new(api, StreamConfig::default());
    let mut snapshots = client.subscribe();

    assert!(client.connect().await);

    // The mock closes the body after the last payload, which ends the channel
    tokio::time::timeout(Duration::from_secs(5), async {
        while snapshots.borrow_and_update().is_connected {
            snapshots.changed().await.unwrap();
        }
    })
    .await
    .expect("channel should close");

    let ids: Vec<_> = client
        .events()
        .iter()
        .map(|e| e.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["e3", "e2", "e1"]);
    assert!(client
        .last_error()
        .unwrap()
        .contains("stream closed by server"));
}

// ============================================================================
// Health probes
// ============================================================================

#[tokio::test]
async fn test_http_probe_outcomes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let probe = HttpHealthProbe::new();
    let timeout = Duration::from_millis(100);

    assert!(probe.probe(&format!("{}/up", server.uri()), timeout).await.is_ok());

    let down = probe
        .probe(&format!("{}/down", server.uri()), timeout)
        .await
        .unwrap_err();
    assert_eq!(down.to_string(), "API error (503): Service Unavailable");

    let slow = probe
        .probe(&format!("{}/slow", server.uri()), timeout)
        .await
        .unwrap_err();
    assert!(slow.is_timeout());
}

#[tokio::test]
async fn test_probe_pool_over_http_never_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ml/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pool = HealthProbePool::new(
        vec![
            ServiceDescriptor::new("main", "Main API", format!("{}/health", server.uri()), "api"),
            ServiceDescriptor::new("ml", "ML", format!("{}/ml/health", server.uri()), "ml"),
        ],
        Arc::new(HttpHealthProbe::new()),
        ProbeConfig::default(),
    );

    pool.check_all().await;

    assert_eq!(
        pool.log().render(),
        vec![
            "Main API: Healthy".to_string(),
            "ML: API error (500): Internal Server Error".to_string(),
        ]
    );
    let summary = pool.summary();
    assert_eq!((summary.alive, summary.down), (1, 1));

    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|r| r.headers.get("authorization").is_none()));
}
