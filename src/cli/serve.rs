//! Serve command: HTTP service with job sweeper and graceful shutdown.

use std::sync::Arc;

use super::ProviderSetup;
use super::args::ServeArgs;
use crate::core::clock::SystemClock;
use crate::core::jobs::JobStore;
use crate::core::orchestrator::PlainTextConverter;
use crate::error::Result;
use crate::server::{self, AppState};
use crate::storage::config::Config;

/// Execute the serve command.
///
/// # Errors
///
/// Returns error if the listener cannot be bound or the server fails.
pub async fn execute(args: &ServeArgs, config: &Config) -> Result<()> {
    let host = args.host.clone().unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let setup = ProviderSetup::from_config(config);
    if let Some(manager) = &setup.manager {
        tracing::info!(providers = ?manager.provider_names(), "Provider manager ready");
    }

    let jobs = Arc::new(JobStore::new(config.jobs.ttl(), Arc::new(SystemClock)));
    let state = AppState::new(
        config,
        setup.manager.clone(),
        jobs.clone(),
        Arc::new(PlainTextConverter),
    );
    tracing::info!(storage_dir = %state.storage_dir.display(), "Upload storage ready");
    let sweeper = jobs.spawn_sweeper(config.jobs.sweep_interval(), Some(state.storage_dir.clone()));

    let result = server::serve(state, &host, port).await;

    sweeper.shutdown().await;
    if let Some(manager) = &setup.manager {
        manager.shutdown().await;
    }
    let cleared = jobs.clear();
    tracing::info!(cleared, "Cleared job store");

    result
}
