//! HTTP client utilities.
//!
//! Shared client construction and status-code classification for all
//! provider adapters.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::provider::ProviderName;
use crate::error::{OcrmuxError, Result};

/// Default timeout for cloud providers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the local provider.
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for liveness probes that do not run a completion.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("ocrmux/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OcrmuxError::Config(format!("failed to build HTTP client: {e}")))
}

/// Send a request, retrying connection failures up to `max_retries` times.
///
/// Only connect errors are retried: the request never reached the backend,
/// so it cannot have been charged.
///
/// # Errors
///
/// Returns `ProviderTimeout` or `ConnectionFailed` once retries are spent.
pub async fn send_with_retries(
    provider: ProviderName,
    timeout: Duration,
    max_retries: u32,
    build: impl Fn() -> RequestBuilder,
) -> Result<Response> {
    let mut attempt = 0;
    loop {
        match build().send().await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_connect() && attempt < max_retries => {
                attempt += 1;
                tracing::debug!(
                    provider = %provider,
                    attempt,
                    error = %e,
                    "Connection failed, retrying"
                );
            }
            Err(e) => return Err(map_transport_error(provider, timeout, &e)),
        }
    }
}

/// Map a reqwest transport error into a provider-scoped error.
#[must_use]
pub fn map_transport_error(
    provider: ProviderName,
    timeout: Duration,
    error: &reqwest::Error,
) -> OcrmuxError {
    if error.is_timeout() {
        OcrmuxError::ProviderTimeout {
            provider: provider.to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        OcrmuxError::ConnectionFailed {
            provider: provider.to_string(),
            message: error.to_string(),
        }
    }
}

/// Turn a non-success response into a typed error; pass success through.
///
/// 429 → `RateLimited`, 403 → `QuotaExceeded`, anything else → `ProviderApiError`.
///
/// # Errors
///
/// Returns the classified error for any non-2xx status.
pub async fn check_status(provider: ProviderName, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    Err(classify_status(provider, status, &body, retry_after))
}

/// Classify an HTTP failure status with its body.
#[must_use]
pub fn classify_status(
    provider: ProviderName,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> OcrmuxError {
    let provider_name = provider.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => OcrmuxError::RateLimited {
            provider: provider_name,
            retry_after,
            message: error_message_from_body(body).unwrap_or_else(|| "Rate limit exceeded".into()),
        },
        StatusCode::FORBIDDEN => OcrmuxError::QuotaExceeded {
            provider: provider_name,
            message: error_message_from_body(body).unwrap_or_else(|| "Quota exceeded".into()),
        },
        _ => OcrmuxError::ProviderApiError {
            provider: provider_name,
            status_code: Some(status.as_u16()),
            message: error_message_from_body(body)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
        },
    }
}

/// Extract an error message from `{"error":{"message":..}}` or `{"error":".."}`.
#[must_use]
pub fn error_message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| error.as_str())
        .map(ToString::to_string)
}

/// Parse a `Retry-After` header given in seconds.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Decode a JSON body, mapping failures to `ParseResponse`.
///
/// # Errors
///
/// Returns `ParseResponse` when the body is not the expected shape.
pub async fn read_json<T: DeserializeOwned>(provider: ProviderName, response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| OcrmuxError::ParseResponse {
            provider: provider.to_string(),
            message: e.to_string(),
        })
}

/// Detect an image MIME type from magic bytes; defaults to JPEG.
#[must_use]
pub fn detect_image_mime(image: &[u8]) -> &'static str {
    if image.starts_with(b"\x89PNG") {
        "image/png"
    } else if image.starts_with(b"GIF") {
        "image/gif"
    } else if image.starts_with(b"RIFF") && image.get(8..12) == Some(b"WEBP") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
