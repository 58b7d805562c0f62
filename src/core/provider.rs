//! Provider identities and the adapter capability trait.
//!
//! Every inference backend implements [`Provider`]. The manager only sees
//! this trait, so adding a backend means adding an implementation under
//! `crate::providers` and a branch in the registry.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OcrmuxError, Result};

// =============================================================================
// Provider Name
// =============================================================================

/// Supported inference backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    /// Fast cloud inference (OpenAI-compatible).
    Groq,
    /// Cost-optimized cloud inference (OpenAI-compatible).
    #[serde(rename = "deepseek")]
    DeepSeek,
    /// Multimodal cloud inference.
    Gemini,
    /// Local inference server.
    Ollama,
}

impl ProviderName {
    /// All providers in default priority order.
    pub const ALL: &'static [Self] = &[Self::Groq, Self::DeepSeek, Self::Gemini, Self::Ollama];

    /// Config and wire name for this provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Groq => "Groq",
            Self::DeepSeek => "DeepSeek",
            Self::Gemini => "Gemini",
            Self::Ollama => "Ollama",
        }
    }

    /// Parse from a config or CLI name.
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.as_str() == lower)
            .copied()
            .ok_or_else(|| OcrmuxError::Config(format!("unknown provider: {name}")))
    }

    /// Whether this backend needs a credential.
    #[must_use]
    pub const fn is_cloud(self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Priority used when the directive is malformed or silent.
    #[must_use]
    pub const fn default_priority(self) -> i32 {
        match self {
            Self::Groq => 1,
            Self::DeepSeek => 2,
            Self::Gemini => 3,
            Self::Ollama => 4,
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Chat Types
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Sampling options for a chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    /// Overrides the adapter's default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.1,
            max_tokens: None,
        }
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Uniform capability over one inference backend.
///
/// Failures must be reported as provider-scoped [`OcrmuxError`] variants so
/// the manager can classify them: `QuotaExceeded`, `RateLimited`, or any
/// other variant for a generic API failure.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend identity.
    fn name(&self) -> ProviderName;

    /// Default text model.
    fn model(&self) -> &str;

    /// Whether `vision_chat` can be used.
    fn supports_vision(&self) -> bool;

    /// Request timeout applied to every call.
    fn timeout(&self) -> Duration;

    /// Text completion.
    async fn chat(&self, messages: &[ChatMessage], opts: &ChatOptions) -> Result<String>;

    /// Completion over a prompt plus one image.
    async fn vision_chat(&self, prompt: &str, image: &[u8]) -> Result<String>;

    /// Lightweight liveness probe. Never errors.
    async fn health_check(&self) -> bool;

    /// Release connections. Default is a no-op.
    async fn close(&self) {}
}
