//! In-memory job lifecycle store.
//!
//! Jobs move `queued → running → done | error` and report an informational
//! step and percentage along the way. All mutation goes through
//! [`JobStore::update`]; readers get clones. A background sweeper removes
//! jobs idle longer than the TTL, along with their upload directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use uuid::Uuid;

use super::clock::Clock;
use crate::error::{OcrmuxError, Result};

/// Default time a job may sit untouched before the sweep removes it.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default spacing between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// Job Model
// =============================================================================

/// Coarse job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// No transitions leave a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Processing stage, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStep {
    Upload,
    Preprocess,
    Parse,
    Postprocess,
    Done,
}

/// A tracked unit of document work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "jobId")]
    pub id: String,
    pub status: JobStatus,
    pub step: JobStep,
    pub percent: u8,
    pub message: String,
    /// Present only when `status == Done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present only when `status == Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            step: JobStep::Upload,
            percent: 0,
            message: "Job created".to_string(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Listing view without the payload.
    #[must_use]
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            status: self.status,
            step: self.step,
            percent: self.percent,
            message: self.message.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Row in a job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    #[serde(rename = "jobId")]
    pub id: String,
    pub status: JobStatus,
    pub step: JobStep,
    pub percent: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial field set applied atomically by [`JobStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub step: Option<JobStep>,
    pub percent: Option<u8>,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Running-state progress report.
    #[must_use]
    pub fn progress(step: JobStep, percent: u8, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            step: Some(step),
            percent: Some(percent),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Successful completion.
    #[must_use]
    pub fn finished(result: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Done),
            step: Some(JobStep::Done),
            percent: Some(100),
            message: Some(message.into()),
            result: Some(result),
            error: None,
        }
    }

    /// Failure. Step and percent are left where processing stopped.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: Some(JobStatus::Error),
            message: Some(format!("Processing failed: {error}")),
            error: Some(error),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// =============================================================================
// Job Store
// =============================================================================

/// Shared job map.
#[derive(Debug)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JobStore {
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert a fresh `queued/upload/0` job and return its id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let job = Job::new(id.clone(), self.clock.now());
        self.write().insert(id.clone(), job);
        tracing::info!(job_id = %id, "Created job");
        id
    }

    /// Copy of a job.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Job> {
        self.read().get(id).cloned()
    }

    /// Apply a partial update and return the new state.
    ///
    /// # Errors
    ///
    /// - `JobNotFound` if the id is absent (deleted or swept)
    /// - `JobFinished` if the job is already `done` or `error`
    /// - `InvalidJobUpdate` if `result` is set without ending in `done`,
    ///   or `error` without ending in `error`
    pub fn update(&self, id: &str, update: JobUpdate) -> Result<Job> {
        let now = self.clock.now();
        let mut jobs = self.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| OcrmuxError::JobNotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Err(OcrmuxError::JobFinished {
                id: id.to_string(),
                status: job.status.as_str().to_string(),
            });
        }

        let next_status = update.status.unwrap_or(job.status);
        if update.result.is_some() && next_status != JobStatus::Done {
            return Err(OcrmuxError::InvalidJobUpdate {
                id: id.to_string(),
                message: "result requires status done".to_string(),
            });
        }
        if update.error.is_some() && next_status != JobStatus::Error {
            return Err(OcrmuxError::InvalidJobUpdate {
                id: id.to_string(),
                message: "error requires status error".to_string(),
            });
        }

        if let Some(step) = update.step {
            if step < job.step {
                tracing::warn!(job_id = %id, from = ?job.step, to = ?step, "Job step moved backwards");
            }
            job.step = step;
        }
        job.status = next_status;
        if let Some(percent) = update.percent {
            job.percent = percent.min(100);
        }
        if let Some(message) = update.message {
            job.message = message;
        }
        if update.result.is_some() {
            job.result = update.result;
        }
        if update.error.is_some() {
            job.error = update.error;
        }
        job.updated_at = job.updated_at.max(now);

        tracing::debug!(
            job_id = %id,
            status = job.status.as_str(),
            step = ?job.step,
            percent = job.percent,
            "Updated job"
        );
        Ok(job.clone())
    }

    /// Remove a job. Returns false if it was not present.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.write().remove(id).is_some();
        if removed {
            tracing::info!(job_id = %id, "Deleted job");
        }
        removed
    }

    /// Summaries of every job, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self.read().values().map(Job::summary).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every job. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut jobs = self.write();
        let count = jobs.len();
        jobs.clear();
        if count > 0 {
            tracing::info!(count, "Cleared all jobs");
        }
        count
    }

    /// Remove jobs whose last update is older than the TTL.
    ///
    /// Returns the ids removed so callers can drop their files.
    pub fn sweep(&self) -> Vec<String> {
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut jobs = self.write();
        let expired: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.updated_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        drop(jobs);

        if !expired.is_empty() {
            tracing::info!(removed = expired.len(), "Swept expired jobs");
        }
        expired
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the handle is shut
    /// down or dropped, or the store itself is dropped.
    ///
    /// With a `storage_dir`, each swept job's upload directory is removed too.
    #[must_use]
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        storage_dir: Option<PathBuf>,
    ) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        let expired = store.sweep();
                        drop(store);
                        if let Some(dir) = &storage_dir {
                            for id in &expired {
                                remove_job_files(dir, id).await;
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Job sweeper stopped");
        });

        tracing::debug!(interval_secs = interval.as_secs(), "Job sweeper started");
        SweeperHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Delete the upload directory of one job under `storage_dir`.
///
/// A missing directory is fine; other failures are logged and skipped.
pub async fn remove_job_files(storage_dir: &Path, job_id: &str) {
    match tokio::fs::remove_dir_all(storage_dir.join(job_id)).await {
        Ok(()) => tracing::debug!(job_id, "Removed job files"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(job_id, error = %e, "Failed to remove job files"),
    }
}

/// Owner of the background sweep task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Job sweeper task ended abnormally");
        }
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
