//! Error types for ocrmux.
//!
//! Uses `thiserror` for structured error types that map to exit codes and
//! HTTP status codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into six main categories:
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Provider**: Quota exhaustion, rate limits, or backend API errors
//! - **Network**: Timeouts and connection failures against a backend
//! - **Job**: Unknown job ids or rejected job updates
//! - **Document**: Conversion failures and unsupported uploads
//! - **Internal**: Unexpected errors, I/O, or unclassified issues
//!
//! Each error has a stable error code (e.g., `OCRM-P001`) for programmatic handling.
//!
//! Provider-scoped errors never escape the provider manager. They are
//! classified with [`OcrmuxError::failure_kind`] and absorbed into status
//! table transitions.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration issues (parse errors, invalid values).
    Configuration,
    /// Provider-specific issues (quota, rate limits, API errors).
    Provider,
    /// Network issues (timeout, connection refused).
    Network,
    /// Job store issues (unknown id, rejected update).
    Job,
    /// Document issues (conversion failure, unsupported upload).
    Document,
    /// Internal errors (bugs, I/O, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration error",
            Self::Provider => "Provider error",
            Self::Network => "Network error",
            Self::Job => "Job error",
            Self::Document => "Document error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Configuration => "C",
            Self::Provider => "P",
            Self::Network => "N",
            Self::Job => "J",
            Self::Document => "D",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Failure Kinds
// =============================================================================

/// How the provider manager treats a failed adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credits or quota exhausted; long cooldown.
    Quota,
    /// Too many requests; short cooldown.
    RateLimit,
    /// Anything else; recovery left to the health sweep.
    Api,
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Invalid configuration or arguments
    ConfigError = 2,
    /// Input document could not be read or converted
    DocumentError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for ocrmux operations.
#[derive(Error, Debug)]
pub enum OcrmuxError {
    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    // ==========================================================================
    // Provider errors
    // ==========================================================================
    /// Provider credits or quota exhausted.
    #[error("{provider} quota exceeded: {message}")]
    QuotaExceeded { provider: String, message: String },

    /// Rate limited by provider.
    #[error("{provider} rate limit: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Provider API returned an error.
    #[error("{provider} API error: {message}")]
    ProviderApiError {
        provider: String,
        status_code: Option<u16>,
        message: String,
    },

    /// Provider response could not be decoded.
    #[error("{provider} returned an unreadable response: {message}")]
    ParseResponse { provider: String, message: String },

    /// Provider returned no text.
    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    /// Vision call routed to a provider without a vision model.
    #[error("{provider} does not support vision requests")]
    VisionUnsupported { provider: String },

    // ==========================================================================
    // Network errors
    // ==========================================================================
    /// Request to a provider timed out.
    #[error("{provider} request timeout after {seconds}s")]
    ProviderTimeout { provider: String, seconds: u64 },

    /// Connection to a provider failed.
    #[error("{provider} request error: {message}")]
    ConnectionFailed { provider: String, message: String },

    // ==========================================================================
    // Job errors
    // ==========================================================================
    /// No job with the given id.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Job already reached a terminal state.
    #[error("job {id} already finished with status {status}")]
    JobFinished { id: String, status: String },

    /// Update would break the result/error invariants.
    #[error("invalid update for job {id}: {message}")]
    InvalidJobUpdate { id: String, message: String },

    // ==========================================================================
    // Document errors
    // ==========================================================================
    /// Document converter failed.
    #[error("failed to convert {path}: {message}")]
    ConversionFailed { path: String, message: String },

    /// Upload rejected before processing.
    #[error("unsupported file {name}: {message}")]
    UnsupportedFile { name: String, message: String },

    // ==========================================================================
    // Server errors
    // ==========================================================================
    /// Listener could not be bound.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP service terminated with an error.
    #[error("http server error: {0}")]
    Serve(#[source] std::io::Error),

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OcrmuxError {
    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => {
                ExitCode::ConfigError
            }

            Self::ConversionFailed { .. } | Self::UnsupportedFile { .. } => {
                ExitCode::DocumentError
            }

            Self::ProviderTimeout { .. } => ExitCode::Timeout,

            Self::QuotaExceeded { .. }
            | Self::RateLimited { .. }
            | Self::ProviderApiError { .. }
            | Self::ParseResponse { .. }
            | Self::EmptyResponse { .. }
            | Self::VisionUnsupported { .. }
            | Self::ConnectionFailed { .. }
            | Self::JobNotFound(_)
            | Self::JobFinished { .. }
            | Self::InvalidJobUpdate { .. }
            | Self::Bind { .. }
            | Self::Serve(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::ConfigParse { .. } | Self::ConfigInvalid { .. } => {
                ErrorCategory::Configuration
            }

            Self::QuotaExceeded { .. }
            | Self::RateLimited { .. }
            | Self::ProviderApiError { .. }
            | Self::ParseResponse { .. }
            | Self::EmptyResponse { .. }
            | Self::VisionUnsupported { .. } => ErrorCategory::Provider,

            Self::ProviderTimeout { .. } | Self::ConnectionFailed { .. } => ErrorCategory::Network,

            Self::JobNotFound(_) | Self::JobFinished { .. } | Self::InvalidJobUpdate { .. } => {
                ErrorCategory::Job
            }

            Self::ConversionFailed { .. } | Self::UnsupportedFile { .. } => {
                ErrorCategory::Document
            }

            Self::Bind { .. } | Self::Serve(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `OCRM-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "OCRM-C001",
            Self::ConfigParse { .. } => "OCRM-C002",
            Self::ConfigInvalid { .. } => "OCRM-C003",

            Self::QuotaExceeded { .. } => "OCRM-P001",
            Self::RateLimited { .. } => "OCRM-P002",
            Self::ProviderApiError { .. } => "OCRM-P003",
            Self::ParseResponse { .. } => "OCRM-P010",
            Self::EmptyResponse { .. } => "OCRM-P011",
            Self::VisionUnsupported { .. } => "OCRM-P020",

            Self::ProviderTimeout { .. } => "OCRM-N001",
            Self::ConnectionFailed { .. } => "OCRM-N002",

            Self::JobNotFound(_) => "OCRM-J001",
            Self::JobFinished { .. } => "OCRM-J002",
            Self::InvalidJobUpdate { .. } => "OCRM-J003",

            Self::ConversionFailed { .. } => "OCRM-D001",
            Self::UnsupportedFile { .. } => "OCRM-D002",

            Self::Bind { .. } => "OCRM-X010",
            Self::Serve(_) => "OCRM-X011",
            Self::Io(_) => "OCRM-X001",
            Self::Json(_) => "OCRM-X002",
            Self::Other(_) => "OCRM-X099",
        }
    }

    /// Classify a provider-scoped failure for status table bookkeeping.
    #[must_use]
    pub const fn failure_kind(&self) -> FailureKind {
        match self {
            Self::QuotaExceeded { .. } => FailureKind::Quota,
            Self::RateLimited { .. } => FailureKind::RateLimit,
            _ => FailureKind::Api,
        }
    }

    /// Returns whether the error is potentially recoverable by retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout { .. } | Self::ConnectionFailed { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider name if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::QuotaExceeded { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::ProviderApiError { provider, .. }
            | Self::ParseResponse { provider, .. }
            | Self::EmptyResponse { provider }
            | Self::VisionUnsupported { provider }
            | Self::ProviderTimeout { provider, .. }
            | Self::ConnectionFailed { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

/// Result type alias for ocrmux operations.
pub type Result<T> = std::result::Result<T, OcrmuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_errors() -> Vec<OcrmuxError> {
        vec![
            OcrmuxError::QuotaExceeded {
                provider: "groq".to_string(),
                message: "credits".to_string(),
            },
            OcrmuxError::RateLimited {
                provider: "groq".to_string(),
                retry_after: None,
                message: "slow down".to_string(),
            },
            OcrmuxError::ProviderApiError {
                provider: "gemini".to_string(),
                status_code: Some(500),
                message: "boom".to_string(),
            },
            OcrmuxError::ParseResponse {
                provider: "ollama".to_string(),
                message: "missing message".to_string(),
            },
            OcrmuxError::EmptyResponse {
                provider: "deepseek".to_string(),
            },
            OcrmuxError::VisionUnsupported {
                provider: "deepseek".to_string(),
            },
            OcrmuxError::ProviderTimeout {
                provider: "groq".to_string(),
                seconds: 30,
            },
            OcrmuxError::ConnectionFailed {
                provider: "ollama".to_string(),
                message: "refused".to_string(),
            },
        ]
    }

    #[test]
    fn error_category_code_prefix() {
        assert_eq!(ErrorCategory::Configuration.code_prefix(), "C");
        assert_eq!(ErrorCategory::Provider.code_prefix(), "P");
        assert_eq!(ErrorCategory::Job.code_prefix(), "J");
        assert_eq!(ErrorCategory::Internal.to_string(), "Internal error");
    }

    #[test]
    fn error_codes_match_category_prefix() {
        let mut errors = provider_errors();
        errors.push(OcrmuxError::Config("bad".to_string()));
        errors.push(OcrmuxError::JobNotFound("abc".to_string()));
        errors.push(OcrmuxError::ConversionFailed {
            path: "a.pdf".to_string(),
            message: "broken".to_string(),
        });

        for err in errors {
            let code = err.error_code();
            let expected = format!("OCRM-{}", err.category().code_prefix());
            assert!(
                code.starts_with(&expected),
                "{code} should start with {expected}"
            );
        }
    }

    #[test]
    fn failure_kind_classification() {
        let kinds: Vec<FailureKind> = provider_errors().iter().map(OcrmuxError::failure_kind).collect();
        assert_eq!(kinds[0], FailureKind::Quota);
        assert_eq!(kinds[1], FailureKind::RateLimit);
        assert!(kinds[2..].iter().all(|k| *k == FailureKind::Api));
    }

    #[test]
    fn every_provider_error_names_its_provider() {
        for err in provider_errors() {
            assert!(err.provider().is_some(), "{err:?} should carry a provider");
        }
        assert_eq!(OcrmuxError::JobNotFound("x".to_string()).provider(), None);
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = OcrmuxError::RateLimited {
            provider: "groq".to_string(),
            retry_after: Some(Duration::from_secs(90)),
            message: "later".to_string(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(90)));
        assert!(err.is_retryable());

        let err = OcrmuxError::QuotaExceeded {
            provider: "groq".to_string(),
            message: "out".to_string(),
        };
        assert_eq!(err.retry_after(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn exit_codes_are_correct() {
        assert_eq!(
            OcrmuxError::Config("x".to_string()).exit_code(),
            ExitCode::ConfigError
        );
        assert_eq!(
            OcrmuxError::ProviderTimeout {
                provider: "groq".to_string(),
                seconds: 30
            }
            .exit_code(),
            ExitCode::Timeout
        );
        assert_eq!(
            OcrmuxError::UnsupportedFile {
                name: "a.exe".to_string(),
                message: "nope".to_string()
            }
            .exit_code(),
            ExitCode::DocumentError
        );
        assert_eq!(i32::from(ExitCode::GeneralError), 1);
    }
}
