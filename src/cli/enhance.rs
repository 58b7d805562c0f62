//! Enhance command: one enhancement run, printed as JSON or text.

use super::args::EnhanceArgs;
use super::{OutputFormat, ProviderSetup, print_json};
use crate::core::models::{DocumentType, EnhancementResult, TargetLanguage};
use crate::error::{OcrmuxError, Result};
use crate::storage::config::Config;

/// Execute the enhance command.
///
/// # Errors
///
/// Returns error if the input cannot be read, the language is unknown,
/// or enhancement is disabled.
pub async fn execute(args: &EnhanceArgs, config: &Config, format: OutputFormat, pretty: bool) -> Result<()> {
    let language = match args.language.as_deref() {
        Some(code) => TargetLanguage::from_code(code).ok_or_else(|| OcrmuxError::ConfigInvalid {
            key: "language".to_string(),
            value: code.to_string(),
            message: "expected auto, vi or en".to_string(),
        })?,
        None => config.enhancement.language(),
    };
    let document_type = DocumentType::from_arg(&args.document_type);

    let text = tokio::fs::read_to_string(&args.file).await?;
    let image = match &args.image {
        Some(path) => Some(tokio::fs::read(path).await?),
        None => None,
    };

    let setup = ProviderSetup::from_config(config);
    let Some(manager) = setup.manager else {
        return Err(OcrmuxError::Config(
            "text enhancement is disabled (enhancement.enabled = false)".to_string(),
        ));
    };

    tracing::debug!(
        file = %args.file.display(),
        document_type = ?document_type,
        language = language.code(),
        has_image = image.is_some(),
        "Running enhancement"
    );
    let result = manager
        .enhance_text(&text, document_type, image.as_deref(), language)
        .await;
    manager.shutdown().await;

    match format {
        OutputFormat::Json => print_json(&result, pretty),
        OutputFormat::Human => {
            print!("{}", render_human(&result));
            Ok(())
        }
    }
}

fn render_human(result: &EnhancementResult) -> String {
    let mut out = String::new();
    out.push_str(&result.enhanced_text);
    if !result.enhanced_text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("\n---\n");
    out.push_str(&format!(
        "provider: {} ({}) in {}ms{}\n",
        result.provider_used,
        result.model_used,
        result.processing_time_ms,
        if result.fallback_occurred { ", after fallback" } else { "" }
    ));
    if !result.improvements.is_empty() {
        out.push_str(&format!("improvements: {}\n", result.improvements.join(", ")));
    }
    if let Some(error) = &result.error {
        out.push_str(&format!("error: {error}\n"));
    }
    out
}
