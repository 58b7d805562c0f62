//! Document processing orchestrator.
//!
//! Drives one uploaded file through conversion and optional enhancement,
//! reporting progress into the [`JobStore`].

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::jobs::{Job, JobStep, JobStore, JobUpdate};
use super::manager::ProviderManager;
use super::models::{DocumentType, EnhancementResult, TargetLanguage};
use crate::error::{OcrmuxError, Result};

/// Extensions readable as UTF-8 text without a converter.
pub const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "log"];

/// Extensions that can be sent to a vision model as-is.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Page separator in plain-text documents.
const FORM_FEED: char = '\u{c}';

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    extension_of(path).is_some_and(|ext| allowed.contains(&ext.as_str()))
}

// =============================================================================
// Converters
// =============================================================================

/// Text extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedDocument {
    pub text: String,
    pub pages: Vec<Page>,
    /// Tables rendered as markdown or raw CSV.
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: usize,
    pub text: String,
}

/// Turns a stored upload into text.
#[async_trait]
pub trait DocumentConverter: Send + Sync + Debug {
    /// Short name shown in progress messages.
    fn name(&self) -> &'static str;

    /// Whether this converter handles the file at `path`.
    fn supports(&self, path: &Path) -> bool;

    /// Extract text.
    ///
    /// # Errors
    ///
    /// Returns `ConversionFailed` when the file cannot be read or decoded.
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument>;
}

/// Reads text-like files directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextConverter;

impl PlainTextConverter {
    fn split_pages(text: &str) -> Vec<Page> {
        text.split(FORM_FEED)
            .enumerate()
            .map(|(i, page)| Page {
                number: i + 1,
                text: page.to_string(),
            })
            .collect()
    }

    /// Contiguous runs of `|`-prefixed lines.
    fn markdown_tables(text: &str) -> Vec<String> {
        let mut tables = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in text.lines() {
            if line.trim_start().starts_with('|') {
                current.push(line);
            } else if !current.is_empty() {
                tables.push(current.join("\n"));
                current.clear();
            }
        }
        if !current.is_empty() {
            tables.push(current.join("\n"));
        }
        tables
    }
}

#[async_trait]
impl DocumentConverter for PlainTextConverter {
    fn name(&self) -> &'static str {
        "plaintext"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, PLAIN_TEXT_EXTENSIONS)
    }

    async fn convert(&self, path: &Path) -> Result<ConvertedDocument> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| OcrmuxError::ConversionFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let tables = match extension_of(path).as_deref() {
            Some("csv") if !text.trim().is_empty() => vec![text.clone()],
            Some("md" | "txt") => Self::markdown_tables(&text),
            _ => Vec::new(),
        };

        Ok(ConvertedDocument {
            pages: Self::split_pages(&text),
            tables,
            text,
        })
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Per-upload processing options, parsed from the `settings` form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessSettings {
    pub document_type: DocumentType,
    pub language: TargetLanguage,
    pub enhance: bool,
    pub use_vision: bool,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            document_type: DocumentType::General,
            language: TargetLanguage::Auto,
            enhance: true,
            use_vision: true,
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Job result payload stored on completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessOutput {
    text: String,
    enhanced_text: String,
    pages: Vec<Page>,
    tables: Vec<String>,
    enhancement: Option<EnhancementResult>,
    meta: ProcessMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMeta {
    converter: &'static str,
    parse_ms: u64,
    enhance_ms: u64,
}

/// Runs uploads through conversion and enhancement.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    converter: Arc<dyn DocumentConverter>,
    manager: Option<Arc<ProviderManager>>,
    jobs: Arc<JobStore>,
}

impl Orchestrator {
    /// `manager` is `None` when enhancement is disabled.
    #[must_use]
    pub fn new(
        converter: Arc<dyn DocumentConverter>,
        manager: Option<Arc<ProviderManager>>,
        jobs: Arc<JobStore>,
    ) -> Self {
        Self {
            converter,
            manager,
            jobs,
        }
    }

    #[must_use]
    pub const fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Process one stored upload for `job_id`.
    ///
    /// Returns the final job, or `None` if the job disappeared mid-flight
    /// (deleted or swept), in which case processing stops silently.
    /// Processing failures are recorded on the job, not returned.
    pub async fn process(&self, job_id: &str, path: &Path, settings: ProcessSettings) -> Option<Job> {
        self.advance(
            job_id,
            JobUpdate::progress(JobStep::Preprocess, 10, "Preprocessing document..."),
        )?;
        self.advance(
            job_id,
            JobUpdate::progress(
                JobStep::Parse,
                30,
                format!("Parsing with {}...", self.converter.name()),
            ),
        )?;

        let parse_start = Instant::now();
        let document = match self.convert(path, settings).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(job_id, path = %path.display(), error = %e, "Document conversion failed");
                return self.advance(job_id, JobUpdate::failed(e.to_string()));
            }
        };
        let parse_ms = elapsed_ms(parse_start);

        let enhance_start = Instant::now();
        let enhancement = match &self.manager {
            Some(manager) if settings.enhance => {
                self.advance(
                    job_id,
                    JobUpdate::progress(JobStep::Postprocess, 70, "Enhancing text..."),
                )?;
                let image = if settings.use_vision && has_extension(path, IMAGE_EXTENSIONS) {
                    tokio::fs::read(path).await.ok()
                } else {
                    None
                };
                Some(
                    manager
                        .enhance_text(
                            &document.text,
                            settings.document_type,
                            image.as_deref(),
                            settings.language,
                        )
                        .await,
                )
            }
            _ => {
                self.advance(
                    job_id,
                    JobUpdate::progress(JobStep::Postprocess, 70, "Building output..."),
                )?;
                None
            }
        };

        let output = ProcessOutput {
            enhanced_text: enhancement
                .as_ref()
                .map_or_else(|| document.text.clone(), |e| e.enhanced_text.clone()),
            text: document.text,
            pages: document.pages,
            tables: document.tables,
            enhancement,
            meta: ProcessMeta {
                converter: self.converter.name(),
                parse_ms,
                enhance_ms: elapsed_ms(enhance_start),
            },
        };

        match serde_json::to_value(&output) {
            Ok(result) => {
                tracing::info!(job_id, parse_ms, "Document processed");
                self.advance(job_id, JobUpdate::finished(result, "Processing complete"))
            }
            Err(e) => self.advance(job_id, JobUpdate::failed(e.to_string())),
        }
    }

    async fn convert(&self, path: &Path, settings: ProcessSettings) -> Result<ConvertedDocument> {
        let plain = has_extension(path, PLAIN_TEXT_EXTENSIONS);

        if self.converter.supports(path) {
            match self.converter.convert(path).await {
                Ok(document) => return Ok(document),
                Err(e) if plain => {
                    tracing::warn!(
                        converter = self.converter.name(),
                        error = %e,
                        "Converter failed, reading file as plain text"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if plain {
            return PlainTextConverter.convert(path).await;
        }

        // Images go straight to a vision model when one can take them.
        if settings.use_vision
            && settings.enhance
            && has_extension(path, IMAGE_EXTENSIONS)
            && self.manager.is_some()
        {
            return Ok(ConvertedDocument::default());
        }

        Err(OcrmuxError::UnsupportedFile {
            name: path
                .file_name()
                .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
            message: format!("no converter available for this file type ({})", self.converter.name()),
        })
    }

    /// Apply an update; `None` means stop.
    fn advance(&self, job_id: &str, update: JobUpdate) -> Option<Job> {
        match self.jobs.update(job_id, update) {
            Ok(job) => Some(job),
            Err(OcrmuxError::JobNotFound(_)) => {
                tracing::debug!(job_id, "Job removed during processing, stopping");
                None
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Job update rejected, stopping");
                None
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
