#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client and full pipeline against a mocked Ollama server

use paper_rag::config::{Config, OllamaConfig};
use paper_rag::database::MemoryStore;
use paper_rag::embeddings::{Embedder, OllamaClient};
use paper_rag::{AnswerComposer, AnswerRequest, Generator, RagError};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const EMBED_MODEL: &str = "test-embed";
const GENERATE_MODEL: &str = "test-generate";

fn ollama_config(server: &MockServer, batch_size: u32) -> OllamaConfig {
    let address = server.address();
    OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        embedding_model: EMBED_MODEL.to_string(),
        generation_model: GENERATE_MODEL.to_string(),
        batch_size,
        embedding_timeout_secs: 10,
        generation_timeout_secs: 10,
    }
}

fn client(server: &MockServer, batch_size: u32) -> OllamaClient {
    OllamaClient::new(&ollama_config(server, batch_size))
        .expect("Failed to create Ollama client")
        .with_retry_attempts(2)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Embeds each input as `[0.0, 1.0]` followed by one slot per keyword it mentions
struct KeywordEmbeddings;

impl KeywordEmbeddings {
    const KEYWORDS: [&'static str; 3] = ["paris", "cats", "sky"];

    fn vectorize(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut vector = vec![0.0, 1.0];
        vector.extend(
            Self::KEYWORDS
                .iter()
                .map(|k| if lower.contains(k) { 10.0 } else { 0.0 }),
        );
        vector
    }
}

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let embeddings = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|i| Self::vectorize(i.as_str().unwrap_or_default()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

#[tokio::test]
async fn embed_posts_inputs_in_order() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": EMBED_MODEL, "input": ["alpha", "beta"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 32);
    let embeddings = client
        .embed(&["alpha".to_string(), "beta".to_string()])
        .await
        .expect("embed");

    assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn embed_splits_into_batches() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .expect(3)
        .mount(&server)
        .await;

    let texts = (0..5).map(|i| format!("text {i}")).collect::<Vec<_>>();
    let embeddings = client(&server, 2).embed(&texts).await.expect("embed");

    assert_eq!(embeddings.len(), 5);
}

#[tokio::test]
async fn embed_count_mismatch_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let result = client(&server, 32)
        .embed(&["one".to_string(), "two".to_string()])
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn embed_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let embeddings = client(&server, 32)
        .embed(&["recovering".to_string()])
        .await
        .expect("second attempt succeeds");

    assert_eq!(embeddings.len(), 1);
}

#[tokio::test]
async fn embed_does_not_retry_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "model not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, 32).embed(&["text".to_string()]).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn embed_timeout_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0]]}))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = OllamaConfig {
        embedding_timeout_secs: 1,
        ..ollama_config(&server, 32)
    };
    let client = OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_retry_attempts(3);

    let result = client.embed(&["slow".to_string()]).await;

    assert!(result.is_err());
    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn generate_is_single_non_streaming_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": GENERATE_MODEL, "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Paris."})))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client(&server, 32)
        .generate("Question: capital?")
        .await
        .expect("generate");

    assert_eq!(answer, "Paris.");
}

#[tokio::test]
async fn generate_failure_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, 32).generate("prompt").await;

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": EMBED_MODEL, "size": 1000, "digest": "abc"},
                {"name": "other:latest"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client(&server, 32);
    let models = client.list_models().expect("list models");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, EMBED_MODEL);

    let error = client.health_check().expect_err("generation model missing");
    assert!(error.to_string().contains(GENERATE_MODEL));
}

#[tokio::test]
async fn pipeline_answers_through_ollama() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "Paris is the capital."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        ollama: ollama_config(&server, 32),
        ..Config::default()
    };
    let composer = AnswerComposer::from_config(&config, Arc::new(MemoryStore::new()))
        .expect("composer")
        .with_chunking(paper_rag::embeddings::ChunkingConfig {
            chunk_size: 5,
            overlap: 1,
        })
        .with_top_k(1);

    let response = composer
        .answer_query(&AnswerRequest::new(
            "The sky is blue. Cats are mammals. Paris is the capital of France.",
            "Tell me about Paris",
        ))
        .await
        .expect("answer");

    assert_eq!(response.answer, "Paris is the capital.");

    let requests = server.received_requests().await.expect("recording enabled");
    let prompt = requests
        .iter()
        .filter(|r| r.url.path() == "/api/generate")
        .map(|r| serde_json::from_slice::<Value>(&r.body).expect("json body"))
        .map(|body| body["prompt"].as_str().unwrap_or_default().to_string())
        .next()
        .expect("generate request sent");

    assert!(prompt.contains("Question: Tell me about Paris"));
    assert!(prompt.contains("Cats are mammals. Paris is"));
}

#[tokio::test]
async fn pipeline_maps_unreachable_embedder() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let config = Config {
        ollama: ollama_config(&server, 32),
        ..Config::default()
    };
    let composer =
        AnswerComposer::from_config(&config, Arc::new(MemoryStore::new())).expect("composer");

    let result = composer
        .answer_query(&AnswerRequest::new("Some document text.", "A question?"))
        .await;

    match result {
        Err(error @ RagError::Embedding(_)) => assert_eq!(error.status_code(), 502),
        other => panic!("expected embedding error, got {other:?}"),
    }
}
