//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/ocrmux/config.toml`
//! - macOS: `~/Library/Application Support/dev.ocrmux.ocrmux/config.toml`
//! - Windows: `%APPDATA%/ocrmux/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `GROQ_API_KEY`, `DEEPSEEK_API_KEY`, `GEMINI_API_KEY`: provider credentials
//! - `OLLAMA_BASE_URL`: local inference endpoint
//! - `AI_PROVIDER_PRIORITY`: priority directive (`groq:1,deepseek:2,...`)
//! - `OCRMUX_ENHANCEMENT_ENABLED`: enable enhancement (1, true, yes, on)
//! - `OCRMUX_TIMEOUT`: cloud timeout in seconds
//! - `OCRMUX_TARGET_LANGUAGE`: default target language (auto, vi, en)
//! - `OCRMUX_STORAGE_DIR`: upload storage directory
//! - `OCRMUX_CONFIG`: override config file path

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::models::TargetLanguage;
use crate::core::provider::ProviderName;
use crate::error::{OcrmuxError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the Groq credential.
pub const ENV_GROQ_API_KEY: &str = "GROQ_API_KEY";
/// Environment variable for the `DeepSeek` credential.
pub const ENV_DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";
/// Environment variable for the Gemini credential.
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Environment variable for the Ollama endpoint.
pub const ENV_OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";
/// Environment variable for the priority directive.
pub const ENV_PRIORITY: &str = "AI_PROVIDER_PRIORITY";
/// Environment variable to toggle enhancement.
pub const ENV_ENHANCEMENT_ENABLED: &str = "OCRMUX_ENHANCEMENT_ENABLED";
/// Environment variable for the cloud timeout in seconds.
pub const ENV_TIMEOUT: &str = "OCRMUX_TIMEOUT";
/// Environment variable for the default target language.
pub const ENV_TARGET_LANGUAGE: &str = "OCRMUX_TARGET_LANGUAGE";
/// Environment variable for the upload storage directory.
pub const ENV_STORAGE_DIR: &str = "OCRMUX_STORAGE_DIR";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "OCRMUX_CONFIG";

/// Default priority directive.
pub const DEFAULT_PRIORITY: &str = "groq:1,deepseek:2,gemini:3,ollama:4";

/// Upper bound for any provider timeout.
const MAX_TIMEOUT_SECONDS: u64 = 600;

// =============================================================================
// Configuration
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enhancement and routing settings.
    pub enhancement: EnhancementConfig,
    /// Per-provider credentials and endpoints.
    pub providers: ProvidersConfig,
    /// Job retention.
    pub jobs: JobsConfig,
    /// HTTP service settings.
    pub server: ServerConfig,
}

/// Enhancement and routing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    pub enabled: bool,
    /// Timeout for cloud providers.
    pub timeout_seconds: u64,
    /// Timeout for the local provider.
    pub local_timeout_seconds: u64,
    /// Connect retries per request.
    pub max_retries: u32,
    /// Priority directive, `name:int` pairs separated by commas.
    pub priority: String,
    /// Default target language (auto, vi, en).
    pub target_language: String,
    /// Route images to vision-capable providers.
    pub use_vision: bool,
}

/// Per-provider settings. Unset fields fall back to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Unset means enabled.
    pub enabled: Option<bool>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub vision_model: Option<String>,
    /// Only used by deepseek.
    pub coder_model: Option<String>,
}

/// Provider sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub groq: ProviderSettings,
    pub deepseek: ProviderSettings,
    pub gemini: ProviderSettings,
    pub ollama: ProviderSettings,
}

impl ProvidersConfig {
    /// Settings for one provider.
    #[must_use]
    pub const fn get(&self, name: ProviderName) -> &ProviderSettings {
        match name {
            ProviderName::Groq => &self.groq,
            ProviderName::DeepSeek => &self.deepseek,
            ProviderName::Gemini => &self.gemini,
            ProviderName::Ollama => &self.ollama,
        }
    }

    const fn get_mut(&mut self, name: ProviderName) -> &mut ProviderSettings {
        match name {
            ProviderName::Groq => &mut self.groq,
            ProviderName::DeepSeek => &mut self.deepseek,
            ProviderName::Gemini => &mut self.gemini,
            ProviderName::Ollama => &mut self.ollama,
        }
    }
}

/// Job retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Jobs idle longer than this are swept.
    pub ttl_hours: u64,
    pub sweep_interval_minutes: u64,
}

/// HTTP service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upload directory. Defaults to the platform data dir.
    pub storage_dir: Option<PathBuf>,
    pub max_upload_bytes: u64,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 30,
            local_timeout_seconds: 60,
            max_retries: 2,
            priority: DEFAULT_PRIORITY.to_string(),
            target_language: "auto".to_string(),
            use_vision: true,
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            sweep_interval_minutes: 60,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            storage_dir: None,
            max_upload_bytes: 15 * 1024 * 1024,
            allowed_extensions: [
                "pdf", "png", "jpg", "jpeg", "webp", "tif", "tiff", "bmp", "doc", "docx", "ppt",
                "pptx", "xls", "xlsx", "txt", "md", "csv", "json", "log",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

impl EnhancementConfig {
    /// Timeout for a provider, local or cloud.
    #[must_use]
    pub const fn timeout_for(&self, name: ProviderName) -> Duration {
        if name.is_cloud() {
            Duration::from_secs(self.timeout_seconds)
        } else {
            Duration::from_secs(self.local_timeout_seconds)
        }
    }

    /// Parsed default language; invalid values are caught by `validate`.
    #[must_use]
    pub fn language(&self) -> TargetLanguage {
        TargetLanguage::from_code(&self.target_language).unwrap_or_default()
    }
}

impl JobsConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 60 * 60)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_minutes * 60)
    }
}

impl ServerConfig {
    /// Resolved upload directory.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().uploads_dir())
    }

    /// Whether a filename has an allowed extension.
    #[must_use]
    pub fn is_allowed(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            })
    }
}

impl Config {
    /// Load configuration from `OCRMUX_CONFIG` or the default path, then
    /// apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid, or if a resolved
    /// value is out of bounds.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load_from(path)?,
            None => match std::env::var(ENV_CONFIG) {
                Ok(path) => Self::load_from(Path::new(&path))?,
                Err(_) => Self::load()?,
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default config file path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| OcrmuxError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| OcrmuxError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored. Unparseable numeric values are logged and
    /// ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for (name, key) in [
            (ProviderName::Groq, ENV_GROQ_API_KEY),
            (ProviderName::DeepSeek, ENV_DEEPSEEK_API_KEY),
            (ProviderName::Gemini, ENV_GEMINI_API_KEY),
        ] {
            if let Some(value) = get(key) {
                self.providers.get_mut(name).api_key = Some(value);
            }
        }
        if let Some(url) = get(ENV_OLLAMA_BASE_URL) {
            self.providers.ollama.base_url = Some(url);
        }
        if let Some(priority) = get(ENV_PRIORITY) {
            self.enhancement.priority = priority;
        }
        if let Some(enabled) = get(ENV_ENHANCEMENT_ENABLED) {
            self.enhancement.enabled = is_truthy(&enabled);
        }
        if let Some(timeout) = get(ENV_TIMEOUT) {
            match timeout.trim().parse::<u64>() {
                Ok(seconds) => self.enhancement.timeout_seconds = seconds,
                Err(_) => tracing::warn!(value = %timeout, "Ignoring invalid OCRMUX_TIMEOUT"),
            }
        }
        if let Some(language) = get(ENV_TARGET_LANGUAGE) {
            self.enhancement.target_language = language;
        }
        if let Some(dir) = get(ENV_STORAGE_DIR) {
            self.server.storage_dir = Some(PathBuf::from(dir));
        }
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - Timeouts are within 1-600 seconds
    /// - Job TTL and sweep interval are non-zero
    /// - The target language is known
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("enhancement.timeout_seconds", self.enhancement.timeout_seconds),
            (
                "enhancement.local_timeout_seconds",
                self.enhancement.local_timeout_seconds,
            ),
        ] {
            if value == 0 || value > MAX_TIMEOUT_SECONDS {
                return Err(invalid(
                    key,
                    value,
                    format!("must be between 1 and {MAX_TIMEOUT_SECONDS} seconds"),
                ));
            }
        }

        if self.jobs.ttl_hours == 0 {
            return Err(invalid("jobs.ttl_hours", 0, "must be greater than zero".into()));
        }
        if self.jobs.sweep_interval_minutes == 0 {
            return Err(invalid(
                "jobs.sweep_interval_minutes",
                0,
                "must be greater than zero".into(),
            ));
        }

        if TargetLanguage::from_code(&self.enhancement.target_language).is_none() {
            return Err(invalid(
                "enhancement.target_language",
                &self.enhancement.target_language,
                "expected one of: auto, vi, en".into(),
            ));
        }

        Ok(())
    }
}

fn invalid(key: &str, value: impl std::fmt::Display, message: String) -> OcrmuxError {
    OcrmuxError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.enhancement.timeout_seconds, 30);
        assert_eq!(config.enhancement.local_timeout_seconds, 60);
        assert_eq!(config.enhancement.priority, DEFAULT_PRIORITY);
        assert_eq!(config.jobs.ttl(), Duration::from_secs(24 * 3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_partial_toml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[enhancement]
timeout_seconds = 45
target_language = "vi"

[providers.groq]
api_key = "gsk_test"

[jobs]
ttl_hours = 2
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.enhancement.timeout_seconds, 45);
        assert_eq!(config.enhancement.local_timeout_seconds, 60);
        assert_eq!(config.enhancement.language(), TargetLanguage::Vietnamese);
        assert_eq!(config.providers.groq.api_key.as_deref(), Some("gsk_test"));
        assert!(config.providers.groq.model.is_none());
        assert_eq!(config.jobs.ttl_hours, 2);
        assert_eq!(config.jobs.sweep_interval_minutes, 60);
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, OcrmuxError::ConfigParse { .. }));
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.enhancement.priority = "ollama:1".to_string();
        config.providers.gemini.model = Some("gemini-1.5-pro".to_string());

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.providers.groq.api_key = Some("from-file".to_string());
        config.apply_env(env(&[
            (ENV_GROQ_API_KEY, "from-env"),
            (ENV_GEMINI_API_KEY, ""),
            (ENV_OLLAMA_BASE_URL, "http://gpu-box:11434/api"),
            (ENV_PRIORITY, "ollama:1,groq:2"),
            (ENV_ENHANCEMENT_ENABLED, "no"),
            (ENV_TIMEOUT, "12"),
        ]));

        assert_eq!(config.providers.groq.api_key.as_deref(), Some("from-env"));
        assert!(config.providers.gemini.api_key.is_none());
        assert_eq!(
            config.providers.ollama.base_url.as_deref(),
            Some("http://gpu-box:11434/api")
        );
        assert_eq!(config.enhancement.priority, "ollama:1,groq:2");
        assert!(!config.enhancement.enabled);
        assert_eq!(config.enhancement.timeout_seconds, 12);
    }

    #[test]
    fn env_ignores_unparseable_timeout() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_TIMEOUT, "soon")]));
        assert_eq!(config.enhancement.timeout_seconds, 30);
    }

    #[test]
    fn validate_timeout_bounds() {
        let mut config = Config::default();
        config.enhancement.timeout_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, OcrmuxError::ConfigInvalid { ref key, .. } if key == "enhancement.timeout_seconds")
        );

        config.enhancement.timeout_seconds = 601;
        assert!(config.validate().is_err());

        config.enhancement.timeout_seconds = 600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_language_and_zero_ttl() {
        let mut config = Config::default();
        config.enhancement.target_language = "fr".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.jobs.ttl_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn timeout_for_distinguishes_local() {
        let config = Config::default();
        assert_eq!(
            config.enhancement.timeout_for(ProviderName::Groq),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.enhancement.timeout_for(ProviderName::Ollama),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn allowed_extensions_are_case_insensitive() {
        let server = ServerConfig::default();
        assert!(server.is_allowed("scan.PDF"));
        assert!(server.is_allowed("notes.md"));
        assert!(!server.is_allowed("malware.exe"));
        assert!(!server.is_allowed("no_extension"));
    }
}
