//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// OCR text enhancement router with multi-provider fallback.
#[derive(Parser, Debug)]
#[command(name = "ocrmux")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Config file (default: platform config dir, or $OCRMUX_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Enhance the text of one file and print the result
    Enhance(EnhanceArgs),

    /// Show configured providers and their health
    Providers,
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Bind address (overrides config)
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port (overrides config)
    #[arg(long, short = 'p', value_name = "PORT")]
    pub port: Option<u16>,
}

/// Arguments for the `enhance` command.
#[derive(Parser, Debug)]
pub struct EnhanceArgs {
    /// Text file holding raw OCR output
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Document type (general, code, invoice, form)
    #[arg(long, value_name = "TYPE", default_value = "general")]
    pub document_type: String,

    /// Target language (auto, vi, en); defaults to the configured one
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Source image, sent to vision-capable providers
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,
}

/// Output format.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Human,
    /// JSON
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_serve_with_overrides() {
        let cli = Cli::try_parse_from(["ocrmux", "serve", "--host", "0.0.0.0", "-p", "9000"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
                assert_eq!(args.port, Some(9000));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ocrmux",
            "enhance",
            "scan.txt",
            "--language",
            "vi",
            "--json",
            "--config",
            "/tmp/ocrmux.toml",
        ])
        .unwrap();
        assert_eq!(cli.effective_format(), OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ocrmux.toml")));
        let Commands::Enhance(args) = cli.command else {
            panic!("expected enhance");
        };
        assert_eq!(args.document_type, "general");
        assert_eq!(args.language.as_deref(), Some("vi"));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["ocrmux"]).is_err());
    }
}
