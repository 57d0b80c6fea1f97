//! Integration test: serve Ollama-style NDJSON from a mock server and run full turns
//! through `OllamaBackend`. Does not require a running Ollama.

use lib::display::RecordingDisplay;
use lib::llm::{ChatBackend, LlmError, OllamaBackend, OllamaClient, OllamaError};
use lib::session::Conversation;
use lib::turn::{run_turn, TurnError};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ndjson(contents: &[&str]) -> String {
    let mut body = String::new();
    for c in contents {
        body.push_str(
            &serde_json::json!({
                "model": "deepseek-r1",
                "message": { "role": "assistant", "content": c },
                "done": false
            })
            .to_string(),
        );
        body.push('\n');
    }
    body.push_str(
        &serde_json::json!({
            "model": "deepseek-r1",
            "message": { "role": "assistant", "content": "" },
            "done": true
        })
        .to_string(),
    );
    body.push('\n');
    body
}

async fn mock_chat(server: &MockServer, status: u16, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({ "model": "deepseek-r1", "stream": true })))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body, "application/x-ndjson"))
        .mount(server)
        .await;
}

fn backend(server: &MockServer) -> OllamaBackend {
    OllamaBackend::new(
        OllamaClient::new(Some(server.uri())),
        "deepseek-r1",
        tokio::runtime::Handle::current(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streams_fragments_in_order_and_ends_at_done() {
    let server = MockServer::start().await;
    mock_chat(&server, 200, ndjson(&["<think>", "ponder", "</think>", "\n\nAnswer"])).await;
    let backend = backend(&server);

    let fragments = tokio::task::spawn_blocking(move || {
        let conv = Conversation::default();
        let stream = backend.stream_chat(conv.messages()).expect("start stream");
        stream
            .map(|r| r.expect("fragment").content)
            .collect::<Vec<_>>()
    })
    .await
    .expect("join");

    assert_eq!(fragments, vec!["<think>", "ponder", "</think>", "\n\nAnswer", ""]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_turn_splits_and_stores_reply() {
    let server = MockServer::start().await;
    mock_chat(&server, 200, ndjson(&["<think>\n", "2+2 is 4", "\n</think>\n\n", "The answer", " is 4."])).await;
    let backend = backend(&server);

    let (outcome, conv) = tokio::task::spawn_blocking(move || {
        let mut conv = Conversation::default();
        let mut display = RecordingDisplay::new();
        let outcome = run_turn(&mut conv, &backend, &mut display, "what is 2+2?");
        (outcome, conv)
    })
    .await
    .expect("join");

    let outcome = outcome.expect("turn succeeds");
    assert_eq!(outcome.thinking, "\n2+2 is 4\n");
    assert_eq!(outcome.response, "\n\nThe answer is 4.");
    assert!(outcome.thinking_complete);
    assert_eq!(conv.len(), 3);
    assert_eq!(
        conv.messages()[2].content,
        "<think>\n2+2 is 4\n</think>\n\nThe answer is 4."
    );

    let received = server.received_requests().await.expect("recorded requests");
    let sent: serde_json::Value = serde_json::from_slice(&received[0].body).expect("json body");
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][1]["content"], "what is 2+2?");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_error_fails_turn_without_assistant_message() {
    let server = MockServer::start().await;
    mock_chat(&server, 404, r#"{"error":"model \"deepseek-r1\" not found"}"#.to_string()).await;
    let backend = backend(&server);

    let (outcome, conv) = tokio::task::spawn_blocking(move || {
        let mut conv = Conversation::default();
        let mut display = RecordingDisplay::new();
        let outcome = run_turn(&mut conv, &backend, &mut display, "hi");
        (outcome, conv)
    })
    .await
    .expect("join");

    match outcome {
        Err(TurnError::Stream(LlmError::Ollama(OllamaError::Api(msg)))) => {
            assert!(msg.contains("404"), "unexpected message: {}", msg)
        }
        other => panic!("expected api error, got {:?}", other),
    }
    assert_eq!(conv.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_without_done_is_incomplete() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "message": { "role": "assistant", "content": "<think>cut off" },
        "done": false
    })
    .to_string()
        + "\n";
    mock_chat(&server, 200, body).await;
    let backend = backend(&server);

    let items = tokio::task::spawn_blocking(move || {
        let conv = Conversation::default();
        backend
            .stream_chat(conv.messages())
            .expect("start stream")
            .collect::<Vec<_>>()
    })
    .await
    .expect("join");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().expect("first fragment").content, "<think>cut off");
    assert!(matches!(
        items[1],
        Err(LlmError::Ollama(OllamaError::Incomplete))
    ));
}

#[tokio::test]
async fn lists_models_from_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                { "name": "deepseek-r1:latest", "size": 4683075271u64 },
                { "name": "llama3.2:latest" }
            ]
        })))
        .mount(&server)
        .await;

    let models = OllamaClient::new(Some(server.uri()))
        .list_models()
        .await
        .expect("list models");
    let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["deepseek-r1:latest", "llama3.2:latest"]);
    assert_eq!(models[0].size, Some(4683075271));
    assert_eq!(models[1].size, None);
}
