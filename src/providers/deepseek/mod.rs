//! `DeepSeek` adapter (cost-optimized cloud inference).
//!
//! OpenAI-compatible, text only. Requests that look like source code are
//! routed to the coder model.

use std::time::Duration;

use async_trait::async_trait;

use super::openai::OpenAiCompatClient;
use crate::core::models::ProviderConfig;
use crate::core::provider::{ChatMessage, ChatOptions, Provider, ProviderName};
use crate::error::{OcrmuxError, Result};

/// Substrings that suggest a payload is code. Matched case-insensitively.
const CODE_INDICATORS: &[&str] = &[
    "function", "class", "import", "def ", "var ", "let ", "const ", "public ", "private ",
    "static ", "void ", "int ", "string ", "#!/", "<?php", "<html>", "<script>", "select ",
    "insert ", "create table", "git ", "npm ", "pip ", "docker ", "kubernetes", "```",
    "console.log", "print(", "system.out", "printf(", "malloc", "free", "struct ", "typedef ",
    "#include", "#define",
];

/// Indicators needed before switching to the coder model.
const CODE_THRESHOLD: usize = 2;

/// Whether the combined message text looks like code.
#[must_use]
pub fn looks_like_code(messages: &[ChatMessage]) -> bool {
    let text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    CODE_INDICATORS
        .iter()
        .filter(|indicator| text.contains(*indicator))
        .count()
        >= CODE_THRESHOLD
}

/// `DeepSeek` backend.
#[derive(Debug, Clone)]
pub struct DeepSeekProvider {
    client: OpenAiCompatClient,
    model: String,
    coder_model: Option<String>,
}

impl DeepSeekProvider {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        tracing::info!(model = %config.model, "Initialized DeepSeek provider");
        Ok(Self {
            client: OpenAiCompatClient::new(config)?,
            model: config.model.clone(),
            coder_model: config.coder_model.clone(),
        })
    }

    fn select_model<'a>(&'a self, messages: &[ChatMessage], opts: &'a ChatOptions) -> &'a str {
        if let Some(model) = opts.model.as_deref() {
            return model;
        }
        match self.coder_model.as_deref() {
            Some(coder) if looks_like_code(messages) => {
                tracing::debug!(model = coder, "Detected code content, using coder model");
                coder
            }
            _ => &self.model,
        }
    }
}

#[async_trait]
impl Provider for DeepSeekProvider {
    fn name(&self) -> ProviderName {
        ProviderName::DeepSeek
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_vision(&self) -> bool {
        false
    }

    fn timeout(&self) -> Duration {
        self.client.timeout()
    }

    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> Result<String> {
        let model = self.select_model(messages, opts);
        self.client.chat(model, messages, opts).await
    }

    async fn vision_chat(&self, _prompt: &str, _image: &[u8]) -> Result<String> {
        Err(OcrmuxError::VisionUnsupported {
            provider: self.name().to_string(),
        })
    }

    async fn health_check(&self) -> bool {
        self.client.health_check(&self.model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_code_with_two_indicators() {
        let msgs = [ChatMessage::user("#include <stdio.h>\nint main() { printf(\"hi\"); }")];
        assert!(looks_like_code(&msgs));
    }

    #[test]
    fn single_indicator_is_not_code() {
        let msgs = [ChatMessage::user("The class met on Tuesday.")];
        assert!(!looks_like_code(&msgs));
    }

    #[test]
    fn indicators_are_case_insensitive() {
        let msgs = [ChatMessage::user("SELECT * FROM t; CREATE TABLE x (id int)")];
        assert!(looks_like_code(&msgs));
    }
}
