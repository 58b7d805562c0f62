//! Provider manager.
//!
//! Runs the fallback protocol for one enhancement request: periodic health
//! sweep, sticky-then-priority candidate ordering, typed failure
//! classification into the status table, and passthrough when nothing works.
//! The manager never returns an error; every failure is folded into the
//! [`EnhancementResult`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::time::timeout;

use super::clock::Clock;
use super::models::{
    DocumentType, EnhancementResult, ProviderConfig, ProviderStatus, TargetLanguage,
};
use super::prompt::{detect_improvements, enhancement_prompt, has_required_diacritics, vision_prompt};
use super::provider::{ChatMessage, ChatOptions, Provider, ProviderName};
use super::status::StatusTable;
use crate::error::{OcrmuxError, Result};

/// Minimum spacing between health sweeps.
pub const HEALTH_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Error recorded when the candidate list is empty.
pub const NO_AVAILABLE_PROVIDERS: &str = "no available providers";

/// Error recorded for a response that lacks the required diacritics.
pub const MISSING_DIACRITICS: &str = "response is missing required diacritics";

/// One configured backend.
struct ManagedProvider {
    config: ProviderConfig,
    adapter: Arc<dyn Provider>,
}

/// Multi-provider enhancement router.
pub struct ProviderManager {
    providers: Vec<ManagedProvider>,
    status: StatusTable,
    sticky: Mutex<Option<ProviderName>>,
    /// Epoch millis of the last sweep; 0 forces a sweep on first use.
    last_sweep_ms: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderManager")
            .field("providers", &self.status.names())
            .field("sticky", &self.active_provider())
            .finish_non_exhaustive()
    }
}

impl ProviderManager {
    /// Build a manager over configured adapters.
    ///
    /// Adapters are ordered by `config.priority`; ties keep input order.
    #[must_use]
    pub fn new(entries: Vec<(ProviderConfig, Arc<dyn Provider>)>, clock: Arc<dyn Clock>) -> Self {
        let mut providers: Vec<ManagedProvider> = entries
            .into_iter()
            .map(|(config, adapter)| ManagedProvider { config, adapter })
            .collect();
        providers.sort_by_key(|p| p.config.priority);

        let table_entries: Vec<(ProviderName, bool)> = providers
            .iter()
            .map(|p| (p.adapter.name(), p.adapter.supports_vision()))
            .collect();
        let status = StatusTable::new(&table_entries, clock.now());

        tracing::info!(count = providers.len(), "Initialized provider manager");

        Self {
            providers,
            status,
            sticky: Mutex::new(None),
            last_sweep_ms: AtomicI64::new(0),
            clock,
        }
    }

    /// Enhance OCR text, falling back across providers.
    pub async fn enhance_text(
        &self,
        text: &str,
        document_type: DocumentType,
        image: Option<&[u8]>,
        language: TargetLanguage,
    ) -> EnhancementResult {
        let start = Instant::now();
        self.maybe_sweep().await;

        let candidates = self.candidates();
        if candidates.is_empty() {
            tracing::warn!("No available providers for text enhancement");
            return EnhancementResult::passthrough(
                text,
                elapsed_ms(start),
                false,
                NO_AVAILABLE_PROVIDERS.to_string(),
            );
        }

        let mut last_error: Option<String> = None;
        let mut fallback_occurred = false;

        for provider in candidates {
            let name = provider.adapter.name();
            tracing::info!(provider = %name, "Attempting text enhancement");

            let attempt_start = Instant::now();
            let use_vision = image.is_some() && provider.adapter.supports_vision();
            let outcome = self
                .attempt(provider, text, document_type, image.filter(|_| use_vision), language)
                .await;

            match outcome {
                Ok(response) if !has_required_diacritics(&response, language) => {
                    tracing::warn!(
                        provider = %name,
                        language = language.code(),
                        "Response missing required diacritics, trying next provider"
                    );
                    last_error = Some(MISSING_DIACRITICS.to_string());
                    fallback_occurred = true;
                }
                Ok(response) => {
                    let latency_ms = elapsed_ms(attempt_start);
                    self.status.mark_success(name, latency_ms, self.clock.now());
                    self.set_sticky(name);

                    let enhanced = response.trim().to_string();
                    let processing_time_ms = elapsed_ms(start);
                    tracing::info!(
                        provider = %name,
                        duration_ms = processing_time_ms,
                        fallback = fallback_occurred,
                        "Text enhancement succeeded"
                    );

                    return EnhancementResult {
                        original_text: text.to_string(),
                        improvements: detect_improvements(text, &enhanced),
                        enhanced_text: enhanced,
                        provider_used: name.to_string(),
                        model_used: provider.model_used(use_vision),
                        processing_time_ms,
                        fallback_occurred,
                        error: None,
                    };
                }
                Err(error) => {
                    let reason = self.status.mark_failure(name, &error, self.clock.now());
                    tracing::warn!(
                        provider = %name,
                        reason = reason.label().unwrap_or("none"),
                        error = %error,
                        "Provider failed, falling back"
                    );
                    last_error = Some(error.to_string());
                    fallback_occurred = true;
                }
            }
        }

        let error = last_error.unwrap_or_else(|| NO_AVAILABLE_PROVIDERS.to_string());
        tracing::error!(error = %error, "All providers failed for text enhancement");
        EnhancementResult::passthrough(text, elapsed_ms(start), true, error)
    }

    /// One candidate call with the provider's timeout applied.
    async fn attempt(
        &self,
        provider: &ManagedProvider,
        text: &str,
        document_type: DocumentType,
        image: Option<&[u8]>,
        language: TargetLanguage,
    ) -> Result<String> {
        let adapter = &provider.adapter;
        let limit = adapter.timeout();

        let call = async {
            match image {
                Some(image) => {
                    tracing::debug!(provider = %adapter.name(), "Using vision enhancement");
                    adapter.vision_chat(&vision_prompt(language), image).await
                }
                None => {
                    let messages = [ChatMessage::user(enhancement_prompt(text, document_type, language))];
                    adapter.chat(&messages, &ChatOptions::default()).await
                }
            }
        };

        let response = timeout(limit, call)
            .await
            .map_err(|_| OcrmuxError::ProviderTimeout {
                provider: adapter.name().to_string(),
                seconds: limit.as_secs(),
            })??;

        if response.trim().is_empty() {
            return Err(OcrmuxError::EmptyResponse {
                provider: adapter.name().to_string(),
            });
        }
        Ok(response)
    }

    /// Available providers in priority order, sticky provider first.
    fn candidates(&self) -> Vec<&ManagedProvider> {
        let mut candidates: Vec<&ManagedProvider> = self
            .providers
            .iter()
            .filter(|p| self.status.is_available(p.adapter.name()))
            .collect();

        if let Some(sticky) = self.active_provider()
            && let Some(pos) = candidates.iter().position(|p| p.adapter.name() == sticky)
        {
            let preferred = candidates.remove(pos);
            candidates.insert(0, preferred);
        }
        candidates
    }

    // =========================================================================
    // Health Sweep
    // =========================================================================

    /// Run the health sweep if the interval has elapsed.
    ///
    /// Concurrent callers race on a compare-and-swap of the last sweep time;
    /// only the winner sweeps.
    async fn maybe_sweep(&self) {
        let now_ms = self.clock.now_ms();
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        let interval_ms = i64::try_from(HEALTH_SWEEP_INTERVAL.as_millis()).unwrap_or(i64::MAX);
        if now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.sweep().await;
    }

    /// Force a health sweep regardless of the interval.
    pub async fn run_health_sweep(&self) {
        self.last_sweep_ms
            .store(self.clock.now_ms(), Ordering::Release);
        self.sweep().await;
    }

    async fn sweep(&self) {
        tracing::debug!("Performing provider health sweep");

        for name in self.status.retire_expired_cooldowns(self.clock.now()) {
            tracing::info!(provider = %name, "Cooldown expired, provider eligible again");
        }

        let probes = self
            .status
            .probe_candidates()
            .into_iter()
            .filter_map(|name| self.providers.iter().find(|p| p.adapter.name() == name))
            .map(|provider| async move {
                let start = Instant::now();
                let healthy = provider.adapter.health_check().await;
                (provider.adapter.name(), healthy, elapsed_ms(start))
            });

        for (name, healthy, latency_ms) in join_all(probes).await {
            let was_available = self.status.is_available(name);
            self.status.record_probe(name, healthy, latency_ms, self.clock.now());
            match (was_available, healthy) {
                (true, false) => tracing::warn!(provider = %name, "Provider failed health check"),
                (false, true) => tracing::info!(provider = %name, latency_ms, "Provider recovered"),
                _ => tracing::debug!(provider = %name, healthy, latency_ms, "Health check"),
            }
        }
    }

    // =========================================================================
    // Introspection and Lifecycle
    // =========================================================================

    /// Status snapshot in priority order, after a due sweep.
    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        self.maybe_sweep().await;
        self.status.snapshot()
    }

    /// Status snapshot without triggering a sweep.
    #[must_use]
    pub fn status_snapshot(&self) -> Vec<ProviderStatus> {
        self.status.snapshot()
    }

    /// Provider that most recently succeeded.
    #[must_use]
    pub fn active_provider(&self) -> Option<ProviderName> {
        *self.sticky.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured providers in priority order.
    #[must_use]
    pub fn provider_names(&self) -> &[ProviderName] {
        self.status.names()
    }

    /// Close every adapter.
    pub async fn shutdown(&self) {
        join_all(self.providers.iter().map(|p| p.adapter.close())).await;
        tracing::info!("Closed all provider connections");
    }

    fn set_sticky(&self, name: ProviderName) {
        *self.sticky.lock().unwrap_or_else(PoisonError::into_inner) = Some(name);
    }
}

impl ManagedProvider {
    fn model_used(&self, vision: bool) -> String {
        if vision {
            self.config
                .vision_model
                .clone()
                .unwrap_or_else(|| self.adapter.model().to_string())
        } else {
            self.adapter.model().to_string()
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
