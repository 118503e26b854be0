//! HTTP collaborators against a local mock server: the document fetcher and
//! the OpenAI-compatible backend.

use funnelscope_runtime::acquisition::{DocumentFetcher, HttpFetcher};
use funnelscope_runtime::config::OpenAiSettings;
use funnelscope_runtime::llm::{AiBackend, Assistant, OpenAiBackend};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

fn settings(server: &MockServer) -> OpenAiSettings {
    OpenAiSettings {
        api_key: "test-key".to_string(),
        base_url: format!("{}/v1", server.uri()),
        model: "test-model".to_string(),
        temperature: 0.0,
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

// ── Fetcher ──

#[tokio::test]
async fn test_fetcher_returns_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pricing"))
        .respond_with(html("<h1>Plans</h1>"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(5_000);
    let doc = fetcher
        .fetch(&format!("{}/pricing", server.uri()))
        .await
        .unwrap();
    assert_eq!(doc.status, 200);
    assert_eq!(doc.body, "<h1>Plans</h1>");
    assert!(doc.final_url.ends_with("/pricing"));
}

#[tokio::test]
async fn test_fetcher_rejects_errors_and_non_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/brochure.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(vec![0x25, 0x50, 0x44, 0x46]),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(5_000);
    let err = fetcher
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"));

    let err = fetcher
        .fetch(&format!("{}/brochure.pdf", server.uri()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not an HTML document"));
}

#[tokio::test]
async fn test_fetcher_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<title>Home</title>"))
        .mount(&server)
        .await;

    let doc = HttpFetcher::new(5_000)
        .fetch(&format!("{}/", server.uri()))
        .await
        .unwrap();
    assert_eq!(doc.body, "<title>Home</title>");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

// ── AI backend ──

#[tokio::test]
async fn test_openai_json_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(completion("Sure! ```json\n{\"score\": 82}\n```"))
        .mount(&server)
        .await;

    let backend = OpenAiBackend::new(settings(&server), Duration::from_secs(5)).unwrap();
    let value = backend.complete_json("system", "prompt").await.unwrap();
    assert_eq!(value, json!({"score": 82}));
}

#[tokio::test]
async fn test_openai_chat_and_errors_through_assistant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [{"role": "system", "content": "summarize"}]
        })))
        .respond_with(completion("  A pricing page.  "))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let backend = Arc::new(OpenAiBackend::new(settings(&server), Duration::from_secs(5)).unwrap());
    let assistant = Assistant::new(backend, Duration::from_secs(5));

    assert_eq!(
        assistant.ask_text("summarize", "page").await.as_deref(),
        Some("A pricing page.")
    );
    let reply: Option<serde_json::Value> = assistant.ask_json("score", "page").await;
    assert!(reply.is_none());
}

#[test]
fn test_openai_requires_key() {
    let settings = OpenAiSettings {
        api_key: "  ".to_string(),
        base_url: "http://localhost".to_string(),
        model: "m".to_string(),
        temperature: 0.0,
    };
    assert!(OpenAiBackend::new(settings, Duration::from_secs(1)).is_err());
}
