//! Core data models for provider routing and enhancement results.
//!
//! Serialized field names are camelCase to match the HTTP surface.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderName;

// =============================================================================
// Provider Config
// =============================================================================

/// Immutable configuration for one provider, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub enabled: bool,
    /// API credential. Empty for the local backend.
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub vision_model: Option<String>,
    /// Code-specialised model, used by backends that offer one.
    pub coder_model: Option<String>,
    /// Lower is tried first. Ties keep config order.
    pub priority: i32,
    pub timeout: Duration,
    pub max_retries: u32,
}

// =============================================================================
// Provider Status
// =============================================================================

/// Why a provider is currently skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    #[default]
    None,
    QuotaExceeded,
    RateLimit,
    ApiError,
    HealthCheckFailed,
}

impl UnavailableReason {
    /// Wire label, `None` for an available provider.
    #[must_use]
    pub const fn label(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::QuotaExceeded => Some("quota_exceeded"),
            Self::RateLimit => Some("rate_limit"),
            Self::ApiError => Some("api_error"),
            Self::HealthCheckFailed => Some("health_check_failed"),
        }
    }

    /// Whether recovery is gated on a cooldown timer rather than a health probe.
    #[must_use]
    pub const fn is_time_gated(self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::RateLimit)
    }
}

/// Mutable health record for one provider.
///
/// `available` is false whenever `unavailable_reason` is not `None`, and
/// `quota_exceeded` implies `unavailable_reason == QuotaExceeded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: ProviderName,
    pub available: bool,
    pub quota_exceeded: bool,
    pub unavailable_reason: UnavailableReason,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_reset_at: Option<DateTime<Utc>>,
    pub supports_vision: bool,
}

impl ProviderStatus {
    /// Fresh record for a newly loaded provider.
    #[must_use]
    pub const fn new(name: ProviderName, supports_vision: bool, now: DateTime<Utc>) -> Self {
        Self {
            name,
            available: true,
            quota_exceeded: false,
            unavailable_reason: UnavailableReason::None,
            last_check: now,
            last_error_message: None,
            response_time_ms: None,
            quota_reset_at: None,
            supports_vision,
        }
    }

    /// Check the documented field invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let reason_ok = self.unavailable_reason == UnavailableReason::None || !self.available;
        let quota_ok =
            !self.quota_exceeded || self.unavailable_reason == UnavailableReason::QuotaExceeded;
        reason_ok && quota_ok
    }
}

// =============================================================================
// Enhancement Request Options
// =============================================================================

/// Document kind, selects a prompt addendum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[default]
    General,
    Code,
    Invoice,
    Form,
}

impl DocumentType {
    /// Parse a document type; unknown values fall back to `General`.
    #[must_use]
    pub fn from_arg(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "code" => Self::Code,
            "invoice" | "receipt" => Self::Invoice,
            "form" => Self::Form,
            _ => Self::General,
        }
    }
}

/// Requested output language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetLanguage {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "vi")]
    Vietnamese,
    #[serde(rename = "en")]
    English,
}

/// Vietnamese diacritic set (lowercase), including `đ`.
const VIETNAMESE_DIACRITICS: &str =
    "àáảãạăằắẳẵặâầấẩẫậèéẻẽẹêềếểễệìíỉĩịòóỏõọôồốổỗộơờớởỡợùúủũụưừứửữựỳýỷỹỵđ";

impl TargetLanguage {
    /// Parse a language code (`auto`, `vi`, `en`).
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "auto" | "" => Some(Self::Auto),
            "vi" | "vie" | "vietnamese" => Some(Self::Vietnamese),
            "en" | "eng" | "english" => Some(Self::English),
            _ => None,
        }
    }

    /// Short code for logs and payloads.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Vietnamese => "vi",
            Self::English => "en",
        }
    }

    /// Characters at least one of which must appear in a long response.
    #[must_use]
    pub const fn required_diacritics(self) -> Option<&'static str> {
        match self {
            Self::Vietnamese => Some(VIETNAMESE_DIACRITICS),
            Self::Auto | Self::English => None,
        }
    }
}

// =============================================================================
// Enhancement Result
// =============================================================================

/// Sentinel provider name when nothing produced output.
pub const NO_PROVIDER: &str = "none";

/// Outcome of one `enhance_text` call. Never an error: failures are
/// embedded in `error` and `enhanced_text` falls back to the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResult {
    pub original_text: String,
    pub enhanced_text: String,
    pub provider_used: String,
    pub model_used: String,
    pub processing_time_ms: u64,
    pub improvements: Vec<String>,
    pub fallback_occurred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnhancementResult {
    /// Passthrough result: original text echoed, no provider used.
    #[must_use]
    pub fn passthrough(
        text: &str,
        processing_time_ms: u64,
        fallback_occurred: bool,
        error: String,
    ) -> Self {
        Self {
            original_text: text.to_string(),
            enhanced_text: text.to_string(),
            provider_used: NO_PROVIDER.to_string(),
            model_used: NO_PROVIDER.to_string(),
            processing_time_ms,
            improvements: Vec::new(),
            fallback_occurred,
            error: Some(error),
        }
    }

    /// Whether a provider produced the enhanced text.
    #[must_use]
    pub fn is_enhanced(&self) -> bool {
        self.provider_used != NO_PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_parsing_falls_back_to_general() {
        assert_eq!(DocumentType::from_arg("Invoice"), DocumentType::Invoice);
        assert_eq!(DocumentType::from_arg("code"), DocumentType::Code);
        assert_eq!(DocumentType::from_arg("letter"), DocumentType::General);
    }

    #[test]
    fn target_language_codes() {
        assert_eq!(TargetLanguage::from_code("VI"), Some(TargetLanguage::Vietnamese));
        assert_eq!(TargetLanguage::from_code("en"), Some(TargetLanguage::English));
        assert_eq!(TargetLanguage::from_code(""), Some(TargetLanguage::Auto));
        assert_eq!(TargetLanguage::from_code("klingon"), None);
        assert!(TargetLanguage::Vietnamese.required_diacritics().is_some());
        assert!(TargetLanguage::English.required_diacritics().is_none());
    }

    #[test]
    fn passthrough_echoes_text() {
        let result = EnhancementResult::passthrough("abc", 3, false, "no available providers".into());
        assert_eq!(result.enhanced_text, "abc");
        assert_eq!(result.provider_used, NO_PROVIDER);
        assert!(!result.is_enhanced());
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = ProviderStatus::new(ProviderName::Groq, true, Utc::now());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["name"], "groq");
        assert_eq!(json["unavailableReason"], "none");
        assert_eq!(json["supportsVision"], true);
        assert!(json.get("quotaResetAt").is_none());
    }

    #[test]
    fn consistency_check_catches_broken_invariants() {
        let mut status = ProviderStatus::new(ProviderName::Gemini, true, Utc::now());
        assert!(status.is_consistent());
        status.unavailable_reason = UnavailableReason::ApiError;
        assert!(!status.is_consistent());
        status.available = false;
        assert!(status.is_consistent());
        status.quota_exceeded = true;
        assert!(!status.is_consistent());
    }
}
