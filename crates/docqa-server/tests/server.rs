use docqa_core::{ConfigOptions, FinishReason, ResultEnvelope, SearchMode};
use docqa_server::{ErrorBody, ListenConfig, ServerConfig, start};
use httpmock::{Method::POST, MockServer};
use serde_json::json;

fn server_config(backend: &str, search_mode: Option<SearchMode>) -> ServerConfig {
    let mut adapter = ConfigOptions::default()
        .with_endpoint(backend)
        .with_credential("k");
    adapter.search_mode = search_mode;
    ServerConfig {
        server: ListenConfig { port: 0 },
        adapter,
    }
}

#[tokio::test]
async fn generate_stream_search_and_errors() {
    let mock = MockServer::start_async().await;
    let answer = mock
        .mock_async(|when, then| {
            when.method(POST)
                .path("/answer")
                .header("authorization", "Bearer k")
                .body_contains("\"stream\":false");
            then.status(200).json_body(json!("Use the dock."));
        })
        .await;
    let _stream = mock
        .mock_async(|when, then| {
            when.method(POST)
                .path("/answer")
                .body_contains("\"stream\":true");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: \"Hel\"\n\ndata: \"Hello\"\n\ndata: [DONE]\n\n");
        })
        .await;
    let _search = mock
        .mock_async(|when, then| {
            when.method(POST).path("/search").body_contains("\"term\":\"laptop\"");
            then.status(200).json_body(json!({
                "hits": [{"document": {"title": "A"}, "score": 0.9}]
            }));
        })
        .await;

    let (addr, handle) = start(server_config(&mock.base_url(), None))
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{}", addr.port());

    let health = client
        .get(format!("{base}/healthz"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(health, "ok");

    let envelope: ResultEnvelope = client
        .post(format!("{base}/v1/generate"))
        .json(&json!({"messages": [{"role": "user", "content": "monitor?"}]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(envelope.text, "Use the dock.");
    assert_eq!(envelope.finish_reason, FinishReason::Stop);
    assert_eq!(envelope.response.model_id, "docqa-answer");
    answer.assert_async().await;

    let resp = client
        .post(format!("{base}/v1/generate"))
        .json(&json!({"messages": [{"role": "system", "content": "only system"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let err: ErrorBody = resp.json().await.unwrap();
    assert_eq!(err.kind, "invalid_input");

    let body = client
        .post(format!("{base}/v1/stream"))
        .json(&json!({"messages": [{"role": "user", "content": "greet"}]}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let deltas: Vec<&str> = body
        .split("\n\n")
        .filter(|event| event.contains("event: text-delta"))
        .filter_map(|event| event.lines().find_map(|l| l.strip_prefix("data: ")))
        .collect();
    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert!(body.contains("event: finish"));
    assert!(!body.contains("event: error"));

    let searched: ResultEnvelope = client
        .post(format!("{base}/v1/search"))
        .json(&json!({"query": "laptop"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(searched.text, "title: A");
    assert_eq!(searched.structured_results.map(|h| h.len()), Some(1));

    let metrics = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("requests_total"));

    handle.abort();
    let _ = handle.await;

    // A backend without routes answers 404, which surfaces as a gateway error.
    let empty = MockServer::start_async().await;
    let (addr2, handle2) = start(server_config(&empty.base_url(), Some(SearchMode::Fulltext)))
        .await
        .unwrap();
    let resp = client
        .post(format!("http://127.0.0.1:{}/v1/generate", addr2.port()))
        .json(&json!({"messages": [{"role": "user", "content": "laptop"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);
    let err: ErrorBody = resp.json().await.unwrap();
    assert_eq!(err.kind, "remote_service");
    assert!(err.error.contains("search"));

    handle2.abort();
    let _ = handle2.await;
}
