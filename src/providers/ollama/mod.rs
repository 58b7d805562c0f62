//! Ollama adapter (local inference).
//!
//! No credential. Liveness is a `GET /api/tags` with a short timeout rather
//! than a completion, since local models can take seconds to load.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::encode_image;
use crate::core::http::{PROBE_TIMEOUT, build_client, check_status, read_json, send_with_retries};
use crate::core::models::ProviderConfig;
use crate::core::provider::{ChatMessage, ChatOptions, Provider, ProviderName, Role};
use crate::error::{OcrmuxError, Result};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    vision_model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaProvider {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        tracing::info!(model = %config.model, base_url = %config.base_url, "Initialized Ollama provider");
        Ok(Self {
            client: build_client(config.timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            vision_model: config
                .vision_model
                .clone()
                .unwrap_or_else(|| "llava".to_string()),
            timeout: config.timeout,
            max_retries: config.max_retries,
        })
    }

    /// Server root, with any trailing `/api` removed.
    fn server_root(&self) -> &str {
        self.base_url.strip_suffix("/api").unwrap_or(&self.base_url)
    }

    async fn send_chat(&self, request: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/chat", self.base_url);
        tracing::debug!(provider = %self.name(), model = request.model, "Sending chat request");

        let response = send_with_retries(self.name(), self.timeout, self.max_retries, || {
            self.client.post(&url).json(request)
        })
        .await?;
        let response = check_status(self.name(), response).await?;
        let body: ChatResponse = read_json(self.name(), response).await?;

        body.message
            .and_then(|m| m.content)
            .ok_or_else(|| OcrmuxError::ParseResponse {
                provider: self.name().to_string(),
                message: "response missing message.content".to_string(),
            })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> Result<String> {
        let request = ChatRequest {
            model: opts.model.as_deref().unwrap_or(&self.model),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                    images: Vec::new(),
                })
                .collect(),
            stream: false,
            options: Options {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
            },
        };
        self.send_chat(&request).await
    }

    async fn vision_chat(&self, prompt: &str, image: &[u8]) -> Result<String> {
        let request = ChatRequest {
            model: &self.vision_model,
            messages: vec![WireMessage {
                role: Role::User,
                content: prompt,
                images: vec![encode_image(image)],
            }],
            stream: false,
            options: Options {
                temperature: ChatOptions::default().temperature,
                num_predict: None,
            },
        };
        self.send_chat(&request).await
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.server_root());
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.name(), error = %e, "Health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::LOCAL_TIMEOUT;

    fn provider(base_url: &str) -> OllamaProvider {
        OllamaProvider::new(&ProviderConfig {
            name: ProviderName::Ollama,
            enabled: true,
            api_key: String::new(),
            base_url: base_url.to_string(),
            model: "qwen2.5:7b".into(),
            vision_model: None,
            coder_model: None,
            priority: 4,
            timeout: LOCAL_TIMEOUT,
            max_retries: 0,
        })
        .unwrap()
    }

    #[test]
    fn server_root_strips_api_suffix() {
        assert_eq!(provider("http://localhost:11434/api").server_root(), "http://localhost:11434");
        assert_eq!(provider("http://localhost:11434/api/").server_root(), "http://localhost:11434");
        assert_eq!(provider("http://gpu:11434").server_root(), "http://gpu:11434");
    }

    #[test]
    fn vision_message_carries_images() {
        let msg = WireMessage {
            role: Role::User,
            content: "read",
            images: vec!["AAAA".into()],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["images"][0], "AAAA");

        let text_only = WireMessage {
            role: Role::User,
            content: "read",
            images: Vec::new(),
        };
        assert!(serde_json::to_value(&text_only).unwrap().get("images").is_none());
    }
}
