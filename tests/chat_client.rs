//! HTTP behaviour of the OpenAI-compatible chat client against a mock server.

use docqa::config::LlmConfig;
use docqa::llm::OpenAiChatModel;
use docqa_core::error::ChatModelError;
use docqa_core::llm::{ChatMessage, ChatModel};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn client(base_url: &str) -> OpenAiChatModel {
    let config = LlmConfig {
        base_url: Some(base_url.to_string()),
        ..LlmConfig::default()
    };
    OpenAiChatModel::new(&config, "test-key").unwrap()
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Answer briefly."),
        ChatMessage::user("What color is the sky?"),
    ]
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
    })
}

#[tokio::test]
async fn returns_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gemma2-9b-it",
            "max_tokens": 1024,
            "messages": [
                {"role": "system", "content": "Answer briefly."},
                {"role": "user", "content": "What color is the sky?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Blue.")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server.uri()).complete(&messages()).await.unwrap();
    assert_eq!(reply, "Blue.");
}

#[tokio::test]
async fn unauthorized_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = client(&server.uri()).complete(&messages()).await.unwrap_err();
    assert!(matches!(err, ChatModelError::Auth(ref d) if d.contains("invalid api key")));
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server.uri()).complete(&messages()).await.unwrap_err();
    assert!(matches!(err, ChatModelError::RateLimit(_)));
}

#[tokio::test]
async fn server_error_and_missing_content_map_to_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let err = client(&server.uri()).complete(&messages()).await.unwrap_err();
    assert!(matches!(err, ChatModelError::Provider(_)));

    let empty = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&empty)
        .await;
    let err = client(&empty.uri()).complete(&messages()).await.unwrap_err();
    assert!(matches!(err, ChatModelError::Provider(ref d) if d.contains("no content")));
}

#[tokio::test]
async fn unreachable_server_maps_to_network() {
    let err = client("http://127.0.0.1:1").complete(&messages()).await.unwrap_err();
    assert!(matches!(err, ChatModelError::Network(_)));
}
