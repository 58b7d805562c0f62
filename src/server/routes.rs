//! Route handlers.

use std::path::{Path as FsPath, PathBuf};

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::AppState;
use super::error::ApiError;
use crate::core::jobs::{Job, JobStatus, JobSummary, remove_job_files};
use crate::core::models::ProviderStatus;
use crate::core::orchestrator::ProcessSettings;
use crate::core::provider::ProviderName;

// =============================================================================
// Extract
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtractQuery {
    pub sync: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedJob {
    job_id: String,
    status: JobStatus,
}

struct Upload {
    filename: String,
    content: Vec<u8>,
    settings: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut settings = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::PayloadTooLarge(e.body_text()));
            }
            Err(e) => return Err(ApiError::BadRequest(e.body_text())),
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string).unwrap_or_default();
                let bytes = field.bytes().await.map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        ApiError::PayloadTooLarge(e.body_text())
                    } else {
                        ApiError::BadRequest("Error reading file".to_string())
                    }
                })?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("settings" | "settings_json") => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest("Invalid settings JSON".to_string()))?;
                settings = Some(text);
            }
            _ => {}
        }
    }

    let (filename, content) =
        file.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    Ok(Upload {
        filename,
        content,
        settings,
    })
}

/// Strip any directory part a client put in the filename.
fn sanitize_filename(name: &str) -> Option<String> {
    FsPath::new(name.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// Overlay the uploaded settings object onto the configured defaults.
fn merge_settings(defaults: ProcessSettings, raw: Option<&str>) -> Result<ProcessSettings, ApiError> {
    let invalid = || ApiError::BadRequest("Invalid settings JSON".to_string());
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(defaults);
    };

    let overrides: Value = serde_json::from_str(raw).map_err(|_| invalid())?;
    let Value::Object(overrides) = overrides else {
        return Err(invalid());
    };
    let mut merged = serde_json::to_value(defaults).map_err(|_| invalid())?;
    if let Value::Object(base) = &mut merged {
        base.extend(overrides);
    }
    serde_json::from_value(merged).map_err(|_| invalid())
}

async fn store_upload(dir: &FsPath, filename: &str, content: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, content).await?;
    Ok(path)
}

pub async fn extract(
    State(state): State<AppState>,
    Query(query): Query<ExtractQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;

    let filename = sanitize_filename(&upload.filename)
        .ok_or_else(|| ApiError::BadRequest("No filename provided".to_string()))?;
    if !state.server.is_allowed(&filename) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type. Allowed: {}",
            state.server.allowed_extensions.join(", ")
        )));
    }
    let max = state.server.max_upload_bytes;
    if upload.content.len() as u64 > max {
        #[allow(clippy::cast_precision_loss)]
        let max_mb = max as f64 / (1024.0 * 1024.0);
        return Err(ApiError::PayloadTooLarge(format!(
            "File too large. Maximum size: {max_mb:.1}MB"
        )));
    }
    let settings = merge_settings(state.default_settings, upload.settings.as_deref())?;

    let job_id = state.jobs.create();
    let job_dir = state.job_dir(&job_id);
    let path = match store_upload(&job_dir, &filename, &upload.content).await {
        Ok(path) => path,
        Err(e) => {
            state.jobs.delete(&job_id);
            tracing::error!(job_id = %job_id, error = %e, "Failed to store upload");
            return Err(ApiError::Internal("Internal server error".to_string()));
        }
    };
    tracing::info!(
        job_id = %job_id,
        file = %filename,
        bytes = upload.content.len(),
        sync = query.sync,
        "Accepted upload"
    );

    if query.sync {
        let job = state
            .orchestrator
            .process(&job_id, &path, settings)
            .await
            .ok_or_else(ApiError::job_not_found)?;
        if job.status == JobStatus::Error {
            return Err(ApiError::Internal(job.message));
        }
        return Ok(Json(job).into_response());
    }

    let orchestrator = state.orchestrator.clone();
    let id = job_id.clone();
    tokio::spawn(async move {
        orchestrator.process(&id, &path, settings).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedJob {
            job_id,
            status: JobStatus::Running,
        }),
    )
        .into_response())
}

// =============================================================================
// Jobs
// =============================================================================

#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<JobList> {
    let jobs = state.jobs.list();
    Json(JobList {
        total: jobs.len(),
        jobs,
    })
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state.jobs.get(&job_id).map(Json).ok_or_else(ApiError::job_not_found)
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.jobs.delete(&job_id) {
        return Err(ApiError::job_not_found());
    }

    remove_job_files(&state.storage_dir, &job_id).await;

    Ok(Json(json!({ "message": format!("Job {job_id} deleted successfully") })))
}

pub async fn cleanup_jobs(State(state): State<AppState>) -> Json<Value> {
    let expired = state.jobs.sweep();
    for id in &expired {
        remove_job_files(&state.storage_dir, id).await;
    }
    Json(json!({
        "message": format!("Cleaned up {} old jobs", expired.len()),
        "remainingJobs": state.jobs.len(),
    }))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
    pub ai_enhancement_enabled: bool,
    pub active_provider: Option<ProviderName>,
    pub ai_providers: Option<Vec<ProviderStatus>>,
    pub jobs: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (providers, active) = match &state.manager {
        Some(manager) => (
            Some(manager.provider_status().await),
            manager.active_provider(),
        ),
        None => (None, None),
    };
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        ai_enhancement_enabled: state.manager.is_some(),
        active_provider: active,
        ai_providers: providers,
        jobs: state.jobs.len(),
    })
}
