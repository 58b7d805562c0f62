//! Core data models, provider routing and job tracking.

pub mod clock;
pub mod http;
pub mod jobs;
pub mod logging;
pub mod manager;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod status;

pub use clock::{Clock, SystemClock};
pub use jobs::{Job, JobStatus, JobStep, JobStore, JobSummary, JobUpdate, SweeperHandle};
pub use manager::ProviderManager;
pub use models::{
    DocumentType, EnhancementResult, ProviderConfig, ProviderStatus, TargetLanguage,
    UnavailableReason,
};
pub use orchestrator::{
    ConvertedDocument, DocumentConverter, Orchestrator, PlainTextConverter, ProcessSettings,
};
pub use provider::{ChatMessage, ChatOptions, Provider, ProviderName, Role};
pub use registry::{RegistryReport, RejectedConfig, build_configs};
pub use status::StatusTable;
