//! OpenAI-compatible `/chat/completions` client.
//!
//! Shared by backends that speak the OpenAI schema with bearer auth.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::encode_image;
use crate::core::http::{
    build_client, check_status, detect_image_mime, read_json, send_with_retries,
};
use crate::core::models::ProviderConfig;
use crate::core::provider::{ChatMessage, ChatOptions, ProviderName, Role};
use crate::error::{OcrmuxError, Result};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: WireContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Bearer-authenticated OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    name: ProviderName,
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiCompatClient {
    /// Build from a provider config.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            name: config.name,
            client: build_client(config.timeout)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            max_retries: config.max_retries,
        })
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Text completion against `model`.
    ///
    /// # Errors
    ///
    /// Returns a classified provider error.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: WireContent::Text(&m.content),
                })
                .collect(),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
        };
        tracing::debug!(provider = %self.name, model, "Sending chat completion request");
        self.complete(&request).await
    }

    /// Prompt plus inline image as a `data:` URI.
    ///
    /// # Errors
    ///
    /// Returns a classified provider error.
    pub async fn vision(&self, model: &str, prompt: &str, image: &[u8]) -> Result<String> {
        let url = format!(
            "data:{};base64,{}",
            detect_image_mime(image),
            encode_image(image)
        );
        let request = ChatRequest {
            model,
            messages: vec![WireMessage {
                role: Role::User,
                content: WireContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url },
                    },
                ]),
            }],
            temperature: ChatOptions::default().temperature,
            max_tokens: None,
        };
        tracing::debug!(provider = %self.name, model, "Sending vision completion request");
        self.complete(&request).await
    }

    /// Minimal completion; healthy on HTTP 200.
    pub async fn health_check(&self, model: &str) -> bool {
        let request = ChatRequest {
            model,
            messages: vec![WireMessage {
                role: Role::User,
                content: WireContent::Text("test"),
            }],
            temperature: ChatOptions::default().temperature,
            max_tokens: Some(5),
        };
        match self.post(&request).await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.name, error = %e, "Health check failed");
                false
            }
        }
    }

    async fn post(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let url = self.endpoint();
        send_with_retries(self.name, self.timeout, self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
        })
        .await
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String> {
        let response = check_status(self.name, self.post(request).await?).await?;
        let body: ChatResponse = read_json(self.name, response).await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OcrmuxError::ParseResponse {
                provider: self.name.to_string(),
                message: "response has no choices".to_string(),
            })?
            .message
            .content
            .unwrap_or_default();

        tracing::debug!(provider = %self.name, chars = content.len(), "Completion received");
        Ok(content)
    }
}
