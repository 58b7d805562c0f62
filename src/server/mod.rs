//! HTTP surface: upload extraction, job polling and health.

pub mod error;
pub mod routes;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::core::jobs::JobStore;
use crate::core::manager::ProviderManager;
use crate::core::orchestrator::{DocumentConverter, Orchestrator, ProcessSettings};
use crate::error::{OcrmuxError, Result};
use crate::storage::config::{Config, ServerConfig};

pub use error::ApiError;

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Multipart framing allowance on top of the upload limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    Requested,
    ListenerFailed,
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// `None` when enhancement is disabled.
    pub manager: Option<Arc<ProviderManager>>,
    pub jobs: Arc<JobStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub server: Arc<ServerConfig>,
    pub storage_dir: PathBuf,
    /// Applied before per-upload overrides.
    pub default_settings: ProcessSettings,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: &Config,
        manager: Option<Arc<ProviderManager>>,
        jobs: Arc<JobStore>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(converter, manager.clone(), jobs.clone()));
        Self {
            default_settings: ProcessSettings {
                language: config.enhancement.language(),
                enhance: manager.is_some(),
                use_vision: config.enhancement.use_vision,
                ..ProcessSettings::default()
            },
            manager,
            jobs,
            orchestrator,
            storage_dir: config.server.storage_dir(),
            server: Arc::new(config.server.clone()),
        }
    }

    /// Upload directory for one job.
    #[must_use]
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.storage_dir.join(job_id)
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.server.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/ocr/extract", post(routes::extract))
        .route("/api/jobs/", get(routes::list_jobs))
        .route("/api/jobs/cleanup", post(routes::cleanup_jobs))
        .route(
            "/api/jobs/{job_id}",
            get(routes::get_job).delete(routes::delete_job),
        )
        .route("/api/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind `host:port` and serve until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns `Bind` if the listener cannot be created, `Serve` if the
/// server loop fails.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let address = format!("{host}:{port}");
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| OcrmuxError::Bind {
            address: address.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "ocrmux server listening");

    serve_on(listener, state, wait_for_shutdown()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns `Serve` if the server loop fails.
pub async fn serve_on<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);
    let signal = async move {
        shutdown.await;
        shutdown_tx.send_replace(ShutdownEvent::Requested);
    };

    let app = router(state);
    let mut server = Box::pin(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
    });
    let mut drain = Box::pin(drain_timeout(shutdown_rx.clone()));

    tokio::select! {
        result = server.as_mut() => result.map_err(OcrmuxError::Serve)?,
        () = drain.as_mut() => {
            tracing::warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "Drain timeout elapsed, forcing shutdown");
        }
    }

    let final_event = *shutdown_rx.borrow();
    tracing::info!(?final_event, "Server shutdown complete");
    Ok(())
}

async fn drain_timeout(mut rx: watch::Receiver<ShutdownEvent>) {
    if rx.wait_for(|event| *event != ShutdownEvent::Pending).await.is_err() {
        // Sender dropped without a signal; the server future decides.
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(DRAIN_TIMEOUT).await;
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(()) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<ShutdownEvent>();

    let event = tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    };
    tracing::info!(?event, "Shutdown signal received");
}
