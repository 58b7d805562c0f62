//! Provider registry.
//!
//! Turns the loaded [`Config`] into the ordered list of [`ProviderConfig`]s
//! the manager runs with. Cloud backends without a credential are skipped;
//! configs that fail validation are dropped with a recorded reason.

use std::collections::HashMap;

use serde::Serialize;

use super::models::ProviderConfig;
use super::provider::ProviderName;
use crate::storage::Config;

// =============================================================================
// Built-in Defaults
// =============================================================================

/// Endpoint and model defaults for one backend.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDefaults {
    pub base_url: &'static str,
    pub model: &'static str,
    pub vision_model: Option<&'static str>,
    pub coder_model: Option<&'static str>,
}

impl ProviderDefaults {
    /// Defaults for a backend.
    #[must_use]
    pub const fn for_provider(name: ProviderName) -> Self {
        match name {
            ProviderName::Groq => Self {
                base_url: "https://api.groq.com/openai/v1",
                model: "llama-3.3-70b-versatile",
                vision_model: Some("llama-3.2-90b-vision-preview"),
                coder_model: None,
            },
            ProviderName::DeepSeek => Self {
                base_url: "https://api.deepseek.com/v1",
                model: "deepseek-chat",
                vision_model: None,
                coder_model: Some("deepseek-coder"),
            },
            // Gemini models are natively multimodal; vision uses the text model.
            ProviderName::Gemini => Self {
                base_url: "https://generativelanguage.googleapis.com/v1beta",
                model: "gemini-1.5-flash",
                vision_model: None,
                coder_model: None,
            },
            ProviderName::Ollama => Self {
                base_url: "http://localhost:11434/api",
                model: "qwen2.5:7b",
                vision_model: Some("llava:7b"),
                coder_model: None,
            },
        }
    }
}

// =============================================================================
// Priority Directive
// =============================================================================

/// Default priority table.
#[must_use]
pub fn default_priorities() -> HashMap<ProviderName, i32> {
    ProviderName::ALL
        .iter()
        .map(|name| (*name, name.default_priority()))
        .collect()
}

/// Parse a `name:int,name:int` directive.
///
/// Any malformed pair discards the whole directive in favour of the
/// defaults. Unknown names are ignored; providers the directive omits keep
/// their default priority.
#[must_use]
pub fn parse_priorities(directive: &str) -> HashMap<ProviderName, i32> {
    let mut priorities = default_priorities();

    for pair in directive.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = pair
            .split_once(':')
            .and_then(|(name, value)| Some((name.trim(), value.trim().parse::<i32>().ok()?)));

        let Some((name, priority)) = parsed else {
            tracing::warn!(directive, pair, "Malformed provider priority, using defaults");
            return default_priorities();
        };

        match ProviderName::from_name(name) {
            Ok(provider) => {
                priorities.insert(provider, priority);
            }
            Err(_) => tracing::debug!(name, "Ignoring unknown provider in priority directive"),
        }
    }

    priorities
}

// =============================================================================
// Registry
// =============================================================================

/// A config dropped during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedConfig {
    pub name: ProviderName,
    pub reason: String,
}

/// Result of building the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryReport {
    /// Valid configs in ascending priority, ties in declaration order.
    #[serde(skip)]
    pub accepted: Vec<ProviderConfig>,
    /// Invalid configs with the reason they were dropped.
    pub rejected: Vec<RejectedConfig>,
    /// Providers left out because they are disabled or lack a credential.
    pub skipped: Vec<ProviderName>,
}

impl RegistryReport {
    /// Accepted provider names in order.
    #[must_use]
    pub fn names(&self) -> Vec<ProviderName> {
        self.accepted.iter().map(|c| c.name).collect()
    }
}

/// Build provider configs from the application config.
#[must_use]
pub fn build_configs(config: &Config) -> RegistryReport {
    let priorities = parse_priorities(&config.enhancement.priority);
    let mut report = RegistryReport::default();

    for &name in ProviderName::ALL {
        let settings = config.providers.get(name);
        let defaults = ProviderDefaults::for_provider(name);
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        if settings.enabled == Some(false) {
            tracing::info!(provider = %name, "Provider disabled in config, skipping");
            report.skipped.push(name);
            continue;
        }
        if name.is_cloud() && api_key.is_empty() {
            tracing::warn!(provider = %name, "API key not configured, skipping provider");
            report.skipped.push(name);
            continue;
        }

        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| defaults.model.to_string());
        let vision_model = match name {
            ProviderName::Gemini => settings.vision_model.clone().or_else(|| Some(model.clone())),
            _ => settings
                .vision_model
                .clone()
                .or_else(|| defaults.vision_model.map(str::to_string)),
        };

        let provider_config = ProviderConfig {
            name,
            enabled: true,
            api_key,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| defaults.base_url.to_string()),
            model,
            vision_model,
            coder_model: settings
                .coder_model
                .clone()
                .or_else(|| defaults.coder_model.map(str::to_string)),
            priority: priorities
                .get(&name)
                .copied()
                .unwrap_or_else(|| name.default_priority()),
            timeout: config.enhancement.timeout_for(name),
            max_retries: config.enhancement.max_retries,
        };

        match validate_config(&provider_config) {
            Ok(()) => {
                tracing::info!(
                    provider = %name,
                    priority = provider_config.priority,
                    model = %provider_config.model,
                    "Loaded provider config"
                );
                report.accepted.push(provider_config);
            }
            Err(reason) => {
                tracing::warn!(provider = %name, %reason, "Dropping invalid provider config");
                report.rejected.push(RejectedConfig { name, reason });
            }
        }
    }

    // Stable: equal priorities keep declaration order.
    report.accepted.sort_by_key(|c| c.priority);
    tracing::info!(count = report.accepted.len(), "Loaded provider configurations");
    report
}

/// Check required fields.
///
/// # Errors
///
/// Returns the reason the config is unusable.
pub fn validate_config(config: &ProviderConfig) -> Result<(), String> {
    if config.base_url.trim().is_empty() {
        return Err("missing base_url".to_string());
    }
    if config.model.trim().is_empty() {
        return Err("missing model".to_string());
    }
    if config.name.is_cloud() && config.api_key.trim().is_empty() {
        return Err("missing API key".to_string());
    }
    Ok(())
}
