use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

mod commands;

/// Rewrites a Markdown document into TTS-friendly Markdown, preserving
/// code fences, links, images, raw HTML, and math byte-for-byte.
#[derive(Parser, Debug)]
#[command(name = "mdvoice")]
#[command(version, about = "Deterministic Markdown-safe rewrite pipeline for text-to-speech", long_about = None)]
pub struct Cli {
    /// Markdown file to rewrite
    pub input: PathBuf,

    /// Write the rewritten Markdown here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Comma-separated subset of steps: mask,prepass-basic,prepass-advanced,detect,apply
    #[arg(long, value_delimiter = ',')]
    pub steps: Option<Vec<String>>,

    /// Layered PipelineConfig TOML file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Acronym whitelist source (one token per line, `#` comments allowed)
    #[arg(long)]
    pub whitelist: Option<PathBuf>,

    /// Detector collaborator endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Detector collaborator model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Write the accepted plan as JSON here
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Write the run report as JSON here
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Increase logging detail
    #[arg(long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(err) = mdvoice_telemetry::init_telemetry(&mdvoice_telemetry::TelemetryConfig {
        level: if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO },
        json_output: false,
    }) {
        eprintln!("failed to initialize logging: {err}");
    }

    match commands::run::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", console::style("error:").red().bold());
            ExitCode::from(1)
        }
    }
}
