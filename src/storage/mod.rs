//! Storage for configuration and platform paths.

pub mod config;
pub mod paths;

pub use config::{
    Config, DEFAULT_PRIORITY, ENV_CONFIG, ENV_DEEPSEEK_API_KEY, ENV_ENHANCEMENT_ENABLED,
    ENV_GEMINI_API_KEY, ENV_GROQ_API_KEY, ENV_OLLAMA_BASE_URL, ENV_PRIORITY, ENV_STORAGE_DIR,
    ENV_TARGET_LANGUAGE, ENV_TIMEOUT, EnhancementConfig, JobsConfig, ProviderSettings,
    ProvidersConfig, ServerConfig,
};
pub use paths::AppPaths;
