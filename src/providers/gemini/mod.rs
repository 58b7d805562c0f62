//! Gemini adapter (multimodal cloud inference).
//!
//! Uses the `generateContent` API with the key as a query parameter.
//! Gemini has no system role, so system messages are folded into the
//! adjacent user turn.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::encode_image;
use crate::core::http::{
    build_client, check_status, detect_image_mime, read_json, send_with_retries,
};
use crate::core::models::ProviderConfig;
use crate::core::provider::{ChatMessage, ChatOptions, Provider, ProviderName, Role};
use crate::error::{OcrmuxError, Result};

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Map chat messages onto Gemini turns.
fn to_contents(messages: &[ChatMessage]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::with_capacity(messages.len());
    let mut pending_system: Option<String> = None;

    for message in messages {
        match message.role {
            Role::System => {
                // Merge into the previous user turn, or hold for the next one.
                match contents.last_mut() {
                    Some(Content { role: "user", parts }) => prepend_text(parts, &message.content),
                    _ => {
                        pending_system = Some(match pending_system.take() {
                            Some(prev) => format!("{prev}\n\n{}", message.content),
                            None => message.content.clone(),
                        });
                    }
                }
            }
            Role::User => {
                let text = match pending_system.take() {
                    Some(system) => format!("{system}\n\n{}", message.content),
                    None => message.content.clone(),
                };
                contents.push(Content {
                    role: "user",
                    parts: vec![Part::Text { text }],
                });
            }
            Role::Assistant => contents.push(Content {
                role: "model",
                parts: vec![Part::Text {
                    text: message.content.clone(),
                }],
            }),
        }
    }

    if let Some(system) = pending_system {
        contents.push(Content {
            role: "user",
            parts: vec![Part::Text { text: system }],
        });
    }
    contents
}

fn prepend_text(parts: &mut [Part], prefix: &str) {
    if let Some(Part::Text { text }) = parts.first_mut() {
        *text = format!("{prefix}\n\n{text}");
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
    timeout: Duration,
    max_retries: u32,
}

impl GeminiProvider {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        tracing::info!(model = %config.model, "Initialized Gemini provider");
        Ok(Self {
            client: build_client(config.timeout)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            vision_model: config
                .vision_model
                .clone()
                .unwrap_or_else(|| config.model.clone()),
            timeout: config.timeout,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    async fn post(&self, model: &str, request: &GenerateRequest) -> Result<reqwest::Response> {
        let url = self.endpoint(model);
        send_with_retries(self.name(), self.timeout, self.max_retries, || {
            self.client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(request)
        })
        .await
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String> {
        tracing::debug!(provider = %self.name(), model, "Sending generateContent request");
        let response = check_status(self.name(), self.post(model, request).await?).await?;
        let body: GenerateResponse = read_json(self.name(), response).await?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| OcrmuxError::ParseResponse {
                provider: self.name().to_string(),
                message: "response missing candidate text".to_string(),
            })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Gemini
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
        let request = GenerateRequest {
            contents: to_contents(messages),
            generation_config: GenerationConfig {
                temperature: Some(opts.temperature),
                max_output_tokens: opts.max_tokens,
            },
        };
        let model = opts.model.as_deref().unwrap_or(&self.model);
        self.generate(model, &request).await
    }

    async fn vision_chat(&self, prompt: &str, image: &[u8]) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: detect_image_mime(image),
                            data: encode_image(image),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: Some(ChatOptions::default().temperature),
                max_output_tokens: None,
            },
        };
        self.generate(&self.vision_model, &request).await
    }

    async fn health_check(&self) -> bool {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part::Text {
                    text: "test".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: None,
                max_output_tokens: Some(5),
            },
        };
        match self.post(&self.model, &request).await {
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

    fn text_of(content: &Content) -> &str {
        match &content.parts[0] {
            Part::Text { text } => text,
            Part::InlineData { .. } => panic!("expected text part"),
        }
    }

    #[test]
    fn system_prefix_joins_first_user_turn() {
        let contents = to_contents(&[ChatMessage::system("rules"), ChatMessage::user("hello")]);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].role, "user");
        assert_eq!(text_of(&contents[0]), "rules\n\nhello");
    }

    #[test]
    fn system_after_user_is_prepended_to_it() {
        let contents = to_contents(&[ChatMessage::user("hello"), ChatMessage::system("rules")]);
        assert_eq!(contents.len(), 1);
        assert_eq!(text_of(&contents[0]), "rules\n\nhello");
    }

    #[test]
    fn assistant_maps_to_model_role() {
        let contents = to_contents(&[
            ChatMessage::user("q"),
            ChatMessage {
                role: Role::Assistant,
                content: "a".into(),
            },
        ]);
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn inline_data_serializes_snake_case() {
        let part = Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/png",
                data: "AAAA".into(),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["inline_data"]["mime_type"], "image/png");
    }

    #[test]
    fn generation_config_is_camel_case() {
        let request = GenerateRequest {
            contents: vec![],
            generation_config: GenerationConfig {
                temperature: Some(0.1),
                max_output_tokens: Some(5),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 5);
    }
}
