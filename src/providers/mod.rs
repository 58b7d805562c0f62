//! Inference backend adapters.
//!
//! Each backend has its own submodule implementing [`Provider`]. Groq and
//! `DeepSeek` share the OpenAI-compatible wire client in [`openai`].

pub mod deepseek;
pub mod gemini;
pub mod groq;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use base64::Engine as _;

pub use crate::core::provider::{ChatMessage, ChatOptions, Provider, ProviderName, Role};
use crate::core::models::ProviderConfig;
use crate::error::Result;

/// Construct the adapter for a config.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.name {
        ProviderName::Groq => Arc::new(groq::GroqProvider::new(config)?),
        ProviderName::DeepSeek => Arc::new(deepseek::DeepSeekProvider::new(config)?),
        ProviderName::Gemini => Arc::new(gemini::GeminiProvider::new(config)?),
        ProviderName::Ollama => Arc::new(ollama::OllamaProvider::new(config)?),
    };
    Ok(provider)
}

/// Construct adapters for every config, skipping any that fail to build.
#[must_use]
pub fn build_all(configs: &[ProviderConfig]) -> Vec<(ProviderConfig, Arc<dyn Provider>)> {
    configs
        .iter()
        .filter_map(|config| match build_provider(config) {
            Ok(provider) => Some((config.clone(), provider)),
            Err(e) => {
                tracing::error!(provider = %config.name, error = %e, "Failed to initialize provider");
                None
            }
        })
        .collect()
}

/// Standard base64 of an image payload.
pub(crate) fn encode_image(image: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(image)
}
