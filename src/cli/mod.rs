//! CLI argument parsing and command dispatch.

pub mod args;
pub mod enhance;
pub mod providers;
pub mod serve;

use std::sync::Arc;

use serde::Serialize;

use crate::core::clock::{Clock, SystemClock};
use crate::core::manager::ProviderManager;
use crate::core::registry::{RegistryReport, build_configs};
use crate::error::Result;
use crate::providers::build_all;
use crate::storage::config::Config;

pub use args::{Cli, Commands, OutputFormat};

/// Provider registry plus the manager built from it.
#[derive(Debug)]
pub struct ProviderSetup {
    pub report: RegistryReport,
    /// `None` when enhancement is disabled.
    pub manager: Option<Arc<ProviderManager>>,
}

impl ProviderSetup {
    /// Build adapters for every accepted config.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Self {
        if !config.enhancement.enabled {
            tracing::info!("Text enhancement disabled");
            return Self {
                report: RegistryReport::default(),
                manager: None,
            };
        }

        let report = build_configs(config);
        let adapters = build_all(&report.accepted);
        let manager = Arc::new(ProviderManager::new(adapters, clock));
        Self {
            report,
            manager: Some(manager),
        }
    }
}

/// Print a value as JSON.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
