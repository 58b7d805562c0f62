//! Integration tests for the HTTP provider adapters against mock servers.
//!
//! Covers request shape, response parsing, status classification and
//! health probes for each backend, plus one end-to-end fallback through the
//! manager with real adapters.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ocrmux::core::models::{DocumentType, ProviderConfig, TargetLanguage, UnavailableReason};
use ocrmux::core::provider::{ChatMessage, ChatOptions, Provider, ProviderName};
use ocrmux::core::{ProviderManager, SystemClock};
use ocrmux::error::OcrmuxError;
use ocrmux::providers::deepseek::DeepSeekProvider;
use ocrmux::providers::gemini::GeminiProvider;
use ocrmux::providers::groq::GroqProvider;
use ocrmux::providers::ollama::OllamaProvider;
use ocrmux::providers::build_provider;
use ocrmux::test_utils::make_test_provider_config;

use common::logger::TestLogger;

// =============================================================================
// Helpers
// =============================================================================

fn config_for(name: ProviderName, server: &MockServer) -> ProviderConfig {
    let mut config = make_test_provider_config(name, 1);
    config.base_url = match name {
        ProviderName::Ollama => format!("{}/api", server.uri()),
        _ => server.uri(),
    };
    config.timeout = Duration::from_secs(5);
    config
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
    })
}

fn user(text: &str) -> [ChatMessage; 1] {
    [ChatMessage::user(text)]
}

// =============================================================================
// Groq (OpenAI-compatible)
// =============================================================================

#[tokio::test]
async fn groq_chat_sends_bearer_and_model() {
    let log = TestLogger::new("groq_chat_sends_bearer_and_model");
    log.phase("setup");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-groq-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "messages": [{"role": "user", "content": "fix me"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Fixed.")))
        .expect(1)
        .mount(&server)
        .await;

    log.phase("execute");
    let provider = GroqProvider::new(&config_for(ProviderName::Groq, &server)).unwrap();
    let text = provider
        .chat(&user("fix me"), &ChatOptions::default())
        .await
        .unwrap();

    log.phase("verify");
    assert_eq!(text, "Fixed.");
    assert!(provider.supports_vision());
    log.finish_ok();
}

#[tokio::test]
async fn groq_vision_sends_data_url_to_vision_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "llama-3.2-90b-vision-preview"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("from image")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GroqProvider::new(&config_for(ProviderName::Groq, &server)).unwrap();
    let text = provider
        .vision_chat("read this", b"\x89PNG\r\n\x1a\nrest")
        .await
        .unwrap();
    assert_eq!(text, "from image");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &body["messages"][0]["content"];
    assert_eq!(parts[0]["type"], "text");
    assert_eq!(parts[0]["text"], "read this");
    assert_eq!(parts[1]["type"], "image_url");
    assert!(
        parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
}

#[tokio::test]
async fn groq_429_becomes_rate_limit_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "42")
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .mount(&server)
        .await;

    let provider = GroqProvider::new(&config_for(ProviderName::Groq, &server)).unwrap();
    let err = provider
        .chat(&user("x"), &ChatOptions::default())
        .await
        .unwrap_err();

    match err {
        OcrmuxError::RateLimited {
            provider,
            retry_after,
            message,
        } => {
            assert_eq!(provider, "groq");
            assert_eq!(retry_after, Some(Duration::from_secs(42)));
            assert_eq!(message, "Rate limit reached");
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn groq_403_becomes_quota_exceeded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let provider = GroqProvider::new(&config_for(ProviderName::Groq, &server)).unwrap();
    let err = provider
        .chat(&user("x"), &ChatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrmuxError::QuotaExceeded { .. }), "{err:?}");
}

#[tokio::test]
async fn groq_500_becomes_api_error_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "overloaded"})))
        .mount(&server)
        .await;

    let provider = GroqProvider::new(&config_for(ProviderName::Groq, &server)).unwrap();
    let err = provider
        .chat(&user("x"), &ChatOptions::default())
        .await
        .unwrap_err();
    match err {
        OcrmuxError::ProviderApiError {
            status_code,
            message,
            ..
        } => {
            assert_eq!(status_code, Some(500));
            assert_eq!(message, "overloaded");
        }
        other => panic!("expected ProviderApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_becomes_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let provider = GroqProvider::new(&config_for(ProviderName::Groq, &server)).unwrap();
    let err = provider
        .chat(&user("x"), &ChatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrmuxError::ParseResponse { .. }), "{err:?}");
}

#[tokio::test]
async fn slow_backend_becomes_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = config_for(ProviderName::Groq, &server);
    config.timeout = Duration::from_millis(200);
    let provider = GroqProvider::new(&config).unwrap();
    let err = provider
        .chat(&user("x"), &ChatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrmuxError::ProviderTimeout { .. }), "{err:?}");
}

#[tokio::test]
async fn openai_compatible_health_check_follows_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"max_tokens": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider = GroqProvider::new(&config_for(ProviderName::Groq, &server)).unwrap();
    assert!(provider.health_check().await);
    assert!(!provider.health_check().await);
}

// =============================================================================
// DeepSeek
// =============================================================================

#[tokio::test]
async fn deepseek_routes_code_to_coder_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "deepseek-coder"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("code")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "deepseek-chat"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("prose")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = DeepSeekProvider::new(&config_for(ProviderName::DeepSeek, &server)).unwrap();

    let code = provider
        .chat(
            &user("import os\ndef main():\n    print('hi')"),
            &ChatOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(code, "code");

    let prose = provider
        .chat(&user("Total amount due on receipt"), &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(prose, "prose");
}

#[tokio::test]
async fn deepseek_has_no_vision() {
    let server = MockServer::start().await;
    let provider = DeepSeekProvider::new(&config_for(ProviderName::DeepSeek, &server)).unwrap();
    assert!(!provider.supports_vision());
    let err = provider.vision_chat("read", b"img").await.unwrap_err();
    assert!(matches!(err, OcrmuxError::VisionUnsupported { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// =============================================================================
// Gemini
// =============================================================================

#[tokio::test]
async fn gemini_generate_content_uses_key_query_and_parses_candidate() {
    let log = TestLogger::new("gemini_generate_content_uses_key_query_and_parses_candidate");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(query_param("key", "test-gemini-key"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "rules\n\nhello"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello."}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(&config_for(ProviderName::Gemini, &server)).unwrap();
    let text = provider
        .chat(
            &[ChatMessage::system("rules"), ChatMessage::user("hello")],
            &ChatOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(text, "Hello.");
    log.finish_ok();
}

#[tokio::test]
async fn gemini_empty_candidates_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(&config_for(ProviderName::Gemini, &server)).unwrap();
    let err = provider
        .chat(&user("x"), &ChatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrmuxError::ParseResponse { .. }), "{err:?}");
}

#[tokio::test]
async fn gemini_vision_sends_inline_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "seen"}]}}]
        })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(&config_for(ProviderName::Gemini, &server)).unwrap();
    assert_eq!(provider.vision_chat("look", b"GIF89a").await.unwrap(), "seen");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], "look");
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/gif");
}

#[tokio::test]
async fn gemini_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(&config_for(ProviderName::Gemini, &server)).unwrap();
    let err = provider
        .chat(&user("x"), &ChatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OcrmuxError::RateLimited { retry_after: None, .. }), "{err:?}");
}

// =============================================================================
// Ollama
// =============================================================================

#[tokio::test]
async fn ollama_chat_is_non_streaming_and_reads_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "qwen2.5:7b", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "qwen2.5:7b",
            "message": {"role": "assistant", "content": "local answer"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(ProviderName::Ollama, &server)).unwrap();
    let text = provider
        .chat(&user("hi"), &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "local answer");
}

#[tokio::test]
async fn ollama_vision_attaches_base64_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llava:7b",
            "messages": [{"role": "user", "content": "describe", "images": ["aW1n"]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "a picture"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(ProviderName::Ollama, &server)).unwrap();
    assert_eq!(provider.vision_chat("describe", b"img").await.unwrap(), "a picture");
}

#[tokio::test]
async fn ollama_health_check_lists_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(&config_for(ProviderName::Ollama, &server)).unwrap();
    assert!(provider.health_check().await);
}

#[tokio::test]
async fn ollama_unreachable_is_unhealthy() {
    let server = MockServer::start().await;
    let config = config_for(ProviderName::Ollama, &server);
    drop(server);

    let provider = OllamaProvider::new(&config).unwrap();
    assert!(!provider.health_check().await);
}

// =============================================================================
// Manager With Real Adapters
// =============================================================================

#[tokio::test]
async fn manager_falls_back_from_rate_limited_groq_to_ollama() {
    let log = TestLogger::new("manager_falls_back_from_rate_limited_groq_to_ollama");
    log.phase("setup");
    let groq_server = MockServer::start().await;
    // Health probe passes, real completion is throttled.
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"max_tokens": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .mount(&groq_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "90"))
        .mount(&groq_server)
        .await;

    let ollama_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&ollama_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "Clean text."}
        })))
        .mount(&ollama_server)
        .await;

    let mut ollama = config_for(ProviderName::Ollama, &ollama_server);
    ollama.priority = 2;
    let entries = [config_for(ProviderName::Groq, &groq_server), ollama]
        .into_iter()
        .map(|config| {
            let provider: Arc<dyn Provider> = build_provider(&config).unwrap();
            (config, provider)
        })
        .collect();
    let manager = ProviderManager::new(entries, Arc::new(SystemClock));

    log.phase("execute");
    let result = manager
        .enhance_text("cl3an text", DocumentType::General, None, TargetLanguage::Auto)
        .await;

    log.phase("verify");
    assert_eq!(result.enhanced_text, "Clean text.");
    assert_eq!(result.provider_used, "ollama");
    assert_eq!(result.model_used, "qwen2.5:7b");
    assert!(result.fallback_occurred);

    let status = manager.status_snapshot();
    assert_eq!(status[0].unavailable_reason, UnavailableReason::RateLimit);
    let reset = status[0].quota_reset_at.unwrap();
    let remaining = (reset - chrono::Utc::now()).num_seconds();
    assert!((80..=90).contains(&remaining), "remaining {remaining}s");
    log.finish_ok();
}
