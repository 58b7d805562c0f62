//! Structured logging setup.
//!
//! Human, compact or JSON (one event per line) output to stderr or a file.
//! CLI flags win over `OCRMUX_LOG*` environment variables; `RUST_LOG`
//! overrides the filter entirely.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_LEVEL_ENV: &str = "OCRMUX_LOG";
const LOG_FORMAT_ENV: &str = "OCRMUX_LOG_FORMAT";
const LOG_FILE_ENV: &str = "OCRMUX_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log level from CLI argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    /// Convert to tracing filter string.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Convert to tracing level.
    #[must_use]
    pub const fn as_tracing_level(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Merge CLI flags with environment variables read through `lookup`.
    ///
    /// `--verbose` raises the level to at least debug. `--json-output`
    /// forces JSON.
    #[must_use]
    pub fn resolve(
        cli_level: Option<&str>,
        json_output: bool,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut level = cli_level
            .and_then(LogLevel::from_arg)
            .or_else(|| env(LOG_LEVEL_ENV).as_deref().and_then(LogLevel::from_arg))
            .unwrap_or_default();
        if verbose && !matches!(level, LogLevel::Trace | LogLevel::Debug) {
            level = LogLevel::Debug;
        }

        let format = if json_output {
            LogFormat::Json
        } else {
            env(LOG_FORMAT_ENV)
                .as_deref()
                .and_then(LogFormat::from_arg)
                .unwrap_or_default()
        };

        Self {
            level,
            format,
            file: env(LOG_FILE_ENV).map(PathBuf::from),
        }
    }

    /// Resolve against the process environment.
    #[must_use]
    pub fn from_env(cli_level: Option<&str>, json_output: bool, verbose: bool) -> Self {
        Self::resolve(cli_level, json_output, verbose, |key| std::env::var(key).ok())
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let make_writer = |file: Option<&std::fs::File>| -> BoxMakeWriter {
        if let Some(file) = file.and_then(|inner| inner.try_clone().ok()) {
            BoxMakeWriter::new(file)
        } else {
            BoxMakeWriter::new(std::io::stderr)
        }
    };

    let level = settings.level;
    let make_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("ocrmux={}", level.as_filter())))
    };

    match settings.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .json()
                .with_writer(make_writer(file.as_ref()))
                .with_span_events(FmtSpan::CLOSE)
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .compact()
                .with_writer(make_writer(file.as_ref()))
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .with_writer(make_writer(file.as_ref()))
                .with_target(false)
                .try_init()
                .ok();
        }
    }
}
