use super::*;
use crate::testing::{EmbeddingResponder, openai_test_config};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn test_client(server: &MockServer, dimension: u32) -> OpenAiClient {
    OpenAiClient::new(&openai_test_config(&server.uri(), dimension), "sk-test")
        .expect("client should build")
        .with_http_client(HttpClient::new(Duration::from_secs(5), 3).with_backoff_unit(1))
}

#[test]
fn client_configuration() {
    let config = OpenAiConfig {
        base_url: "http://test-host:1234/v1".to_string(),
        embedding_model: "test-embed".to_string(),
        batch_size: 16,
        ..OpenAiConfig::default()
    };
    let client = OpenAiClient::new(&config, "sk-test").expect("client should build");

    assert_eq!(client.embedding_model, "test-embed");
    assert_eq!(client.batch_size, 16);
    assert_eq!(client.dimension, 1536);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.auth_header(), "Bearer sk-test");
}

#[test]
fn invalid_base_url_is_rejected() {
    let config = OpenAiConfig {
        base_url: "not a url".to_string(),
        ..OpenAiConfig::default()
    };
    assert!(OpenAiClient::new(&config, "sk-test").is_err());
}

#[tokio::test]
async fn embeddings_are_batched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "text-embedding-ada-002" })))
        .respond_with(EmbeddingResponder::new(4))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, 4);
    let texts: Vec<String> = (0..150).map(|i| format!("chunk number {}", i)).collect();

    let embeddings = tokio::task::spawn_blocking(move || client.embed_documents(&texts))
        .await
        .expect("task should join")
        .expect("embedding should succeed");

    assert_eq!(embeddings.len(), 150);
    assert!(embeddings.iter().all(|e| e.len() == 4));
}

#[tokio::test]
async fn embeddings_follow_response_index_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "object": "embedding", "index": 1, "embedding": [0.0, 1.0] },
                { "object": "embedding", "index": 0, "embedding": [1.0, 0.0] }
            ],
            "model": "text-embedding-ada-002"
        })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, 2);
    let texts = vec!["first".to_string(), "second".to_string()];

    let embeddings = tokio::task::spawn_blocking(move || client.embed_documents(&texts))
        .await
        .expect("task should join")
        .expect("embedding should succeed");

    assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn wrong_dimension_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EmbeddingResponder::new(3))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, 1536);

    let result = tokio::task::spawn_blocking(move || client.embed_query("question"))
        .await
        .expect("task should join");

    match result {
        Err(RagError::Embedding(message)) => assert!(message.contains("1536")),
        other => panic!("expected embedding error, got {:?}", other),
    }
}

#[tokio::test]
async fn unauthorized_requests_fail_fast() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, 4);

    let result = tokio::task::spawn_blocking(move || client.embed_query("question"))
        .await
        .expect("task should join");

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn empty_input_skips_the_network() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(EmbeddingResponder::new(4))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, 4);
    let embeddings = tokio::task::spawn_blocking(move || client.embed_documents(&[]))
        .await
        .expect("task should join")
        .expect("empty input should succeed");

    assert!(embeddings.is_empty());
}

#[tokio::test]
async fn completion_returns_first_choice() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-3.5-turbo-instruct",
            "prompt": "Question: how many vacation days?\nHelpful Answer:",
            "max_tokens": 256
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-1",
            "object": "text_completion",
            "choices": [
                { "text": " Employees receive 20 days.", "index": 0, "finish_reason": "stop" }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, 4);
    let answer = tokio::task::spawn_blocking(move || {
        client.generate("Question: how many vacation days?\nHelpful Answer:")
    })
    .await
    .expect("task should join")
    .expect("completion should succeed");

    assert_eq!(answer, " Employees receive 20 days.");
}

#[tokio::test]
async fn completion_without_choices_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server, 4);
    let result = tokio::task::spawn_blocking(move || client.generate("prompt"))
        .await
        .expect("task should join");

    assert!(matches!(result, Err(RagError::Generation(_))));
}
