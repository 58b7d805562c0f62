//! Structured per-test logging.
#![allow(dead_code)]
//!
//! ```rust,ignore
//! let log = TestLogger::new("fallback_skips_cooled_down_provider");
//! log.phase("setup");
//! // ...
//! log.finish_ok();
//! ```
//!
//! - `TEST_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `TEST_LOG_JSON` - "1" or "true" for one JSON object per line

use std::env;
use std::fmt::Display;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    test: &'a str,
    message: &'a str,
    phase: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<serde_json::Value>,
}

struct Settings {
    min_level: LogLevel,
    json: bool,
}

fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| Settings {
        min_level: env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| LogLevel::parse(&s))
            .unwrap_or(LogLevel::Info),
        json: env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

/// Per-test logger with phase and duration tracking.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
    phase: Mutex<String>,
}

impl TestLogger {
    #[must_use]
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            phase: Mutex::new("init".to_string()),
        };
        logger.log(LogLevel::Info, "Test starting", None, None);
        logger
    }

    /// Common phases: "setup", "act", "assert".
    pub fn phase(&self, phase: &str) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase.to_string();
        }
        self.log(LogLevel::Debug, &format!("Phase: {phase}"), None, None);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None, None);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None, None);
    }

    pub fn with_context(&self, level: LogLevel, message: &str, context: serde_json::Value) {
        self.log(level, message, None, Some(context));
    }

    pub fn finish_ok(&self) {
        let duration_ms = self.elapsed_ms();
        self.log(
            LogLevel::Info,
            &format!("Test passed (duration: {duration_ms}ms)"),
            Some(duration_ms),
            None,
        );
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        duration_ms: Option<u64>,
        context: Option<serde_json::Value>,
    ) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }
        let phase = self
            .phase
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let timestamp = Utc::now();

        if settings.json {
            let entry = LogEntry {
                timestamp,
                level,
                test: &self.test_name,
                message,
                phase: &phase,
                duration_ms,
                context,
            };
            if let Ok(json) = serde_json::to_string(&entry) {
                eprintln!("{json}");
            }
        } else {
            let ts = timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ");
            eprintln!("[{ts}] [{level}] [{}:{phase}] {message}", self.test_name);
        }
    }
}
