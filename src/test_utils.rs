//! Test utilities for ocrmux.
//!
//! Scripted provider adapters, a manually driven clock, a canned document
//! converter and temp-directory helpers, shared by unit and integration
//! tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ocrmux::test_utils::*;
//!
//! let clock = ManualClock::starting_now();
//! let groq = ScriptedProvider::new(ProviderName::Groq).replying("fixed text");
//! let manager = make_test_manager(&[groq.clone()], clock.clone());
//! ```

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::core::clock::Clock;
use crate::core::manager::ProviderManager;
use crate::core::models::ProviderConfig;
use crate::core::orchestrator::{ConvertedDocument, DocumentConverter, Page};
use crate::core::provider::{ChatMessage, ChatOptions, Provider, ProviderName};
use crate::core::registry::ProviderDefaults;
use crate::error::{OcrmuxError, Result};

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    #[must_use]
    pub fn starting_now() -> Arc<Self> {
        Self::new(Utc::now())
    }

    /// Move time forward.
    ///
    /// # Panics
    ///
    /// Panics if `by` does not fit a `TimeDelta`.
    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).expect("duration fits TimeDelta");
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Scripted Provider
// =============================================================================

/// Provider adapter that replays queued outcomes.
///
/// Queued results are consumed first; once the queue is empty the fixed
/// reply (if any) is returned, otherwise an API error.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: ProviderName,
    model: String,
    vision: bool,
    timeout: Duration,
    delay: Option<Duration>,
    health_delay: Option<Duration>,
    script: Mutex<VecDeque<Result<String>>>,
    reply: Mutex<Option<String>>,
    healthy: AtomicBool,
    calls: AtomicUsize,
    vision_calls: AtomicUsize,
    health_checks: AtomicUsize,
    closed: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(name: ProviderName) -> Self {
        Self {
            name,
            model: ProviderDefaults::for_provider(name).model.to_string(),
            vision: false,
            timeout: Duration::from_secs(30),
            delay: None,
            health_delay: None,
            script: Mutex::new(VecDeque::new()),
            reply: Mutex::new(None),
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            vision_calls: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn replying(self, text: impl Into<String>) -> Self {
        *self.reply.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.into());
        self
    }

    #[must_use]
    pub const fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sleep this long before answering each call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep this long before answering each health check.
    #[must_use]
    pub const fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn failing_with(self, error: OcrmuxError) -> Self {
        self.push(Err(error));
        self
    }

    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn push(&self, outcome: Result<String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    pub fn set_reply(&self, text: Option<&str>) {
        *self.reply.lock().unwrap_or_else(PoisonError::into_inner) = text.map(String::from);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Text and vision calls combined.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn vision_calls(&self) -> usize {
        self.vision_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn answer(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(outcome) = queued {
            return outcome;
        }
        self.reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| OcrmuxError::ProviderApiError {
                provider: self.name.to_string(),
                status_code: Some(500),
                message: "script exhausted".to_string(),
            })
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> ProviderName {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn chat(&self, messages: &[ChatMessage], _opts: &ChatOptions) -> Result<String> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.answer(&prompt).await
    }

    async fn vision_chat(&self, prompt: &str, _image: &[u8]) -> Result<String> {
        self.vision_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(prompt).await
    }

    async fn health_check(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.health_delay {
            tokio::time::sleep(delay).await;
        }
        self.healthy.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Factories
// =============================================================================

/// Provider config with default endpoint and model for `name`.
#[must_use]
pub fn make_test_provider_config(name: ProviderName, priority: i32) -> ProviderConfig {
    let defaults = ProviderDefaults::for_provider(name);
    ProviderConfig {
        name,
        enabled: true,
        api_key: if name.is_cloud() {
            format!("test-{name}-key")
        } else {
            String::new()
        },
        base_url: defaults.base_url.to_string(),
        model: defaults.model.to_string(),
        vision_model: defaults.vision_model.map(String::from),
        coder_model: defaults.coder_model.map(String::from),
        priority,
        timeout: Duration::from_secs(30),
        max_retries: 0,
    }
}

/// Manager over scripted adapters, prioritised in slice order.
#[must_use]
pub fn make_test_manager(
    providers: &[Arc<ScriptedProvider>],
    clock: Arc<dyn Clock>,
) -> ProviderManager {
    let entries = providers
        .iter()
        .zip(1..)
        .map(|(provider, priority)| {
            let mut config = make_test_provider_config(provider.name, priority);
            config.timeout = provider.timeout;
            (config, Arc::clone(provider) as Arc<dyn Provider>)
        })
        .collect();
    ProviderManager::new(entries, clock)
}

/// Converter that returns canned text, or fails with `error`.
#[derive(Debug, Clone, Default)]
pub struct StaticConverter {
    pub text: String,
    pub error: Option<String>,
}

impl StaticConverter {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            error: Some(message.into()),
        }
    }
}

#[async_trait]
impl DocumentConverter for StaticConverter {
    fn name(&self) -> &'static str {
        "static"
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }

    async fn convert(&self, path: &Path) -> Result<ConvertedDocument> {
        if let Some(message) = &self.error {
            return Err(OcrmuxError::ConversionFailed {
                path: path.display().to_string(),
                message: message.clone(),
            });
        }
        Ok(ConvertedDocument {
            text: self.text.clone(),
            pages: vec![Page {
                number: 1,
                text: self.text.clone(),
            }],
            tables: Vec::new(),
        })
    }
}

/// Minimal TOML config with every provider disabled except the local one.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[enhancement]
enabled = true
timeout_seconds = 10
priority = "ollama:1,groq:2"

[providers.groq]
enabled = false

[providers.ollama]
base_url = "http://127.0.0.1:11434/api"
model = "qwen2.5:7b"

[jobs]
ttl_hours = 1
sweep_interval_minutes = 5
"#
    .to_string()
}

// =============================================================================
// Temp Directory Utilities
// =============================================================================

/// A temporary directory for tests, deleted on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file (and parent directories) with the given content.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_ref())
            .expect("Failed to write test file");
        path
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.path().join(name).exists()
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::starting_now();
        let before = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - before, TimeDelta::seconds(90));
    }

    #[tokio::test]
    async fn scripted_provider_drains_queue_then_replies() {
        let provider = ScriptedProvider::new(ProviderName::Groq)
            .failing_with(OcrmuxError::QuotaExceeded {
                provider: "groq".into(),
                message: "out".into(),
            })
            .replying("ok");

        let opts = ChatOptions::default();
        let msgs = [ChatMessage::user("hi")];
        assert!(provider.chat(&msgs, &opts).await.is_err());
        assert_eq!(provider.chat(&msgs, &opts).await.unwrap(), "ok");
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.prompts(), vec!["hi", "hi"]);
    }

    #[test]
    fn test_dir_round_trip() {
        let dir = TestDir::new();
        dir.create_file("nested/a.txt", "hello");
        assert!(dir.file_exists("nested/a.txt"));
        assert_contains!(dir.read_file("nested/a.txt").unwrap(), "hello");
        assert_not_contains!(dir.read_file("nested/a.txt").unwrap(), "bye");
    }
}
