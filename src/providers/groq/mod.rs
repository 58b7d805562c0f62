//! Groq adapter (fast cloud inference).
//!
//! OpenAI-compatible; vision requests go to the configured vision model.

use std::time::Duration;

use async_trait::async_trait;

use super::openai::OpenAiCompatClient;
use crate::core::models::ProviderConfig;
use crate::core::provider::{ChatMessage, ChatOptions, Provider, ProviderName};
use crate::error::{OcrmuxError, Result};

/// Groq backend.
#[derive(Debug, Clone)]
pub struct GroqProvider {
    client: OpenAiCompatClient,
    model: String,
    vision_model: Option<String>,
}

impl GroqProvider {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        tracing::info!(model = %config.model, "Initialized Groq provider");
        Ok(Self {
            client: OpenAiCompatClient::new(config)?,
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
        })
    }
}

#[async_trait]
impl Provider for GroqProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Groq
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_vision(&self) -> bool {
        self.vision_model.is_some()
    }

    fn timeout(&self) -> Duration {
        self.client.timeout()
    }

    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> Result<String> {
        let model = opts.model.as_deref().unwrap_or(&self.model);
        self.client.chat(model, messages, opts).await
    }

    async fn vision_chat(&self, prompt: &str, image: &[u8]) -> Result<String> {
        let model = self
            .vision_model
            .as_deref()
            .ok_or_else(|| OcrmuxError::VisionUnsupported {
                provider: self.name().to_string(),
            })?;
        self.client.vision(model, prompt, image).await
    }

    async fn health_check(&self) -> bool {
        self.client.health_check(&self.model).await
    }
}
