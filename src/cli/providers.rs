//! Providers command: registry plus a freshly swept status table.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{OutputFormat, ProviderSetup, print_json};
use crate::core::models::ProviderStatus;
use crate::core::registry::RegistryReport;
use crate::error::Result;
use crate::storage::config::Config;
use crate::util::{format_countdown, format_latency, format_relative_time};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvidersReport<'a> {
    enhancement_enabled: bool,
    registry: &'a RegistryReport,
    active_provider: Option<String>,
    status: Vec<ProviderStatus>,
}

/// Execute the providers command.
///
/// # Errors
///
/// Returns error if JSON output fails.
pub async fn execute(config: &Config, format: OutputFormat, pretty: bool) -> Result<()> {
    let setup = ProviderSetup::from_config(config);

    let (status, active) = match &setup.manager {
        Some(manager) => {
            manager.run_health_sweep().await;
            let snapshot = manager.status_snapshot();
            let active = manager.active_provider().map(|p| p.to_string());
            manager.shutdown().await;
            (snapshot, active)
        }
        None => (Vec::new(), None),
    };

    match format {
        OutputFormat::Json => print_json(
            &ProvidersReport {
                enhancement_enabled: setup.manager.is_some(),
                registry: &setup.report,
                active_provider: active,
                status,
            },
            pretty,
        ),
        OutputFormat::Human => {
            if setup.manager.is_none() {
                println!("Text enhancement is disabled.");
                return Ok(());
            }
            print!(
                "{}",
                render_human(&setup.report, &status, Utc::now())
            );
            Ok(())
        }
    }
}

/// Render the status table as aligned text.
#[must_use]
pub fn render_human(
    report: &RegistryReport,
    status: &[ProviderStatus],
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    if status.is_empty() {
        out.push_str("No providers configured.\n");
    } else {
        let _ = writeln!(out, "{:<4} {:<10} {:<12} {:<9} {}", "Prio", "Provider", "State", "Latency", "Detail");
        for entry in status {
            let priority = report
                .accepted
                .iter()
                .find(|c| c.name == entry.name)
                .map_or_else(|| "-".to_string(), |c| c.priority.to_string());
            let state = if entry.available { "available" } else { "unavailable" };
            let latency = entry
                .response_time_ms
                .map_or_else(|| "-".to_string(), format_latency);
            let detail = describe(entry, now);
            let _ = writeln!(
                out,
                "{priority:<4} {:<10} {state:<12} {latency:<9} {detail}",
                entry.name.as_str()
            );
        }
    }

    if !report.skipped.is_empty() {
        let names: Vec<&str> = report.skipped.iter().map(|n| n.as_str()).collect();
        let _ = writeln!(out, "\nSkipped (disabled or no API key): {}", names.join(", "));
    }
    for rejected in &report.rejected {
        let _ = writeln!(out, "Rejected {}: {}", rejected.name, rejected.reason);
    }
    out
}

fn describe(entry: &ProviderStatus, now: DateTime<Utc>) -> String {
    let checked = format!("checked {}", format_relative_time(entry.last_check, now));
    match entry.unavailable_reason.label() {
        None => checked,
        Some(reason) => {
            let mut detail = reason.to_string();
            if let Some(reset_at) = entry.quota_reset_at {
                let _ = write!(detail, ", retry {}", format_countdown(reset_at, now));
            }
            if let Some(message) = &entry.last_error_message {
                let _ = write!(detail, " ({message})");
            }
            detail
        }
    }
}
