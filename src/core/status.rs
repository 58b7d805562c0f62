//! Provider status table.
//!
//! One health record per configured provider. Each record sits behind its
//! own lock so concurrent enhancement calls never lose an update to
//! `available` or `quota_reset_at`; callers only ever see cloned snapshots.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::models::{ProviderStatus, UnavailableReason};
use super::provider::ProviderName;
use crate::error::{FailureKind, OcrmuxError};

/// Cooldown after a quota failure.
pub const QUOTA_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Cooldown after a rate-limit failure that carried no `Retry-After`.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Shared mutable health records, keyed by provider.
#[derive(Debug)]
pub struct StatusTable {
    order: Vec<ProviderName>,
    entries: HashMap<ProviderName, Mutex<ProviderStatus>>,
}

impl StatusTable {
    /// Build a table with every provider available.
    ///
    /// `providers` is `(name, supports_vision)` in priority order.
    #[must_use]
    pub fn new(providers: &[(ProviderName, bool)], now: DateTime<Utc>) -> Self {
        let order = providers.iter().map(|(name, _)| *name).collect();
        let entries = providers
            .iter()
            .map(|&(name, vision)| (name, Mutex::new(ProviderStatus::new(name, vision, now))))
            .collect();
        Self { order, entries }
    }

    /// Providers in priority order.
    #[must_use]
    pub fn names(&self) -> &[ProviderName] {
        &self.order
    }

    /// Snapshot of one record.
    #[must_use]
    pub fn get(&self, name: ProviderName) -> Option<ProviderStatus> {
        self.entries.get(&name).map(|entry| lock(entry).clone())
    }

    /// Snapshot of every record in priority order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProviderStatus> {
        self.order.iter().filter_map(|name| self.get(*name)).collect()
    }

    /// Whether the provider may be tried right now.
    #[must_use]
    pub fn is_available(&self, name: ProviderName) -> bool {
        self.entries
            .get(&name)
            .is_some_and(|entry| lock(entry).available)
    }

    /// Record a successful completion.
    ///
    /// A quota or rate-limit cooldown recorded by a concurrent call is kept:
    /// those lift only when `quota_reset_at` passes.
    pub fn mark_success(&self, name: ProviderName, latency_ms: u64, now: DateTime<Utc>) {
        self.update(name, |status| {
            if !status.unavailable_reason.is_time_gated() {
                clear_errors(status);
            }
            status.response_time_ms = Some(latency_ms);
            status.last_check = now;
        });
    }

    /// Apply the cooldown or error state for an adapter failure.
    ///
    /// Returns the reason that was recorded.
    pub fn mark_failure(
        &self,
        name: ProviderName,
        error: &OcrmuxError,
        now: DateTime<Utc>,
    ) -> UnavailableReason {
        let (reason, reset_at) = match error.failure_kind() {
            FailureKind::Quota => (UnavailableReason::QuotaExceeded, Some(now + delta(QUOTA_COOLDOWN))),
            FailureKind::RateLimit => {
                let cooldown = error.retry_after().unwrap_or(RATE_LIMIT_COOLDOWN);
                (UnavailableReason::RateLimit, Some(now + delta(cooldown)))
            }
            FailureKind::Api => (UnavailableReason::ApiError, None),
        };

        let mut recorded = reason;
        self.update(name, |status| {
            status.last_error_message = Some(error.to_string());
            status.last_check = now;
            // A late generic failure must not shorten a running cooldown.
            if reset_at.is_none() && status.unavailable_reason.is_time_gated() {
                recorded = status.unavailable_reason;
                return;
            }
            status.available = false;
            status.quota_exceeded = reason == UnavailableReason::QuotaExceeded;
            status.unavailable_reason = reason;
            status.quota_reset_at = reset_at;
        });
        recorded
    }

    /// Restore providers whose cooldown has passed. Returns the names restored.
    pub fn retire_expired_cooldowns(&self, now: DateTime<Utc>) -> Vec<ProviderName> {
        let mut restored = Vec::new();
        for name in &self.order {
            self.update(*name, |status| {
                if !status.available && status.quota_reset_at.is_some_and(|reset| reset <= now) {
                    clear_errors(status);
                    status.last_check = now;
                    restored.push(*name);
                }
            });
        }
        restored
    }

    /// Providers a health sweep should probe.
    ///
    /// Available providers plus those parked on a probe-gated reason.
    /// Cooldown-gated providers only recover through their timer.
    #[must_use]
    pub fn probe_candidates(&self) -> Vec<ProviderName> {
        self.order
            .iter()
            .copied()
            .filter(|name| {
                self.get(*name).is_some_and(|status| {
                    status.available
                        || matches!(
                            status.unavailable_reason,
                            UnavailableReason::ApiError | UnavailableReason::HealthCheckFailed
                        )
                })
            })
            .collect()
    }

    /// Record a probe outcome.
    ///
    /// A record that picked up a time-gated reason while the probe was in
    /// flight is left untouched.
    pub fn record_probe(
        &self,
        name: ProviderName,
        healthy: bool,
        latency_ms: u64,
        now: DateTime<Utc>,
    ) {
        self.update(name, |status| {
            if status.unavailable_reason.is_time_gated() {
                return;
            }
            status.last_check = now;
            if healthy {
                clear_errors(status);
                status.response_time_ms = Some(latency_ms);
            } else {
                status.available = false;
                status.quota_exceeded = false;
                status.unavailable_reason = UnavailableReason::HealthCheckFailed;
                status.quota_reset_at = None;
                status.last_error_message = Some("health check failed".to_string());
            }
        });
    }

    fn update(&self, name: ProviderName, f: impl FnOnce(&mut ProviderStatus)) {
        if let Some(entry) = self.entries.get(&name) {
            let mut status = lock(entry);
            f(&mut status);
            debug_assert!(status.is_consistent(), "inconsistent status for {name}");
        }
    }
}

fn clear_errors(status: &mut ProviderStatus) {
    status.available = true;
    status.quota_exceeded = false;
    status.unavailable_reason = UnavailableReason::None;
    status.quota_reset_at = None;
    status.last_error_message = None;
}

// A panic while holding the lock cannot leave a record half-written: every
// mutation is a plain field assignment.
fn lock(entry: &Mutex<ProviderStatus>) -> MutexGuard<'_, ProviderStatus> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
