//! pdfstat
//!
//! Batch feature extraction for directories of PDF documents:
//!
//! - `extract`: assign identifiers, extract features, write the dataset and cleaning report
//! - `annotate`: render the leading pages and ask a vision model for design/style labels
//! - `merge`: fold an annotation file into the dataset
//! - `run`: all of the above in order
//! - `summary`: font, keyword and design distributions of the dataset

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "pdfstat")]
#[command(about = "Extract per-document features from a directory of PDFs")]
struct Args {
    /// Path to a pdfstat.toml configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Input directory (overrides [input].dir)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Output directory (overrides [output].dir)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract features and write the dataset and cleaning report
    Extract {
        /// Rename inputs to <id>.pdf
        #[arg(long)]
        rename: bool,

        /// Documents processed at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-document timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Request design/style labels for every extracted document
    Annotate {
        /// Model name sent to the annotation endpoint
        #[arg(long)]
        model: Option<String>,

        /// Base URL of an OpenAI-compatible API
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Merge an annotation file into the dataset
    Merge {
        /// Annotation file (defaults to [output].annotations)
        annotations: Option<PathBuf>,
    },
    /// Extract, annotate and merge
    Run {
        /// Rename inputs to <id>.pdf
        #[arg(long)]
        rename: bool,

        /// Stop after extraction
        #[arg(long)]
        skip_annotation: bool,
    },
    /// Print distributions of the dataset
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(input) = args.input {
        config.input.dir = input;
    }
    if let Some(output) = args.output {
        config.output.dir = output;
    }

    match args.command {
        Command::Extract {
            rename,
            concurrency,
            timeout_ms,
        } => {
            config.input.rename_on_disk |= rename;
            if let Some(concurrency) = concurrency {
                config.extraction.concurrency = concurrency;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.extraction.timeout_ms = timeout_ms;
            }
            commands::extract(&config).await?;
        }
        Command::Annotate { model, base_url } => {
            if let Some(model) = model {
                config.annotation.model = model;
            }
            if let Some(base_url) = base_url {
                config.annotation.base_url = base_url;
            }
            let provider = commands::openai_provider(&config)?;
            let renderer = commands::pdfium_renderer(&config)?;
            commands::annotate(&config, provider, renderer).await?;
        }
        Command::Merge { annotations } => {
            let path = annotations.unwrap_or_else(|| config.output.annotations_path());
            commands::merge(&config, &path)?;
        }
        Command::Run {
            rename,
            skip_annotation,
        } => {
            config.input.rename_on_disk |= rename;
            commands::run(&config, skip_annotation).await?;
        }
        Command::Summary => {
            commands::summary(&config)?;
        }
    }

    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_subcommands() {
        let args = Args::parse_from(["pdfstat", "-v", "extract", "--rename", "--concurrency", "4"]);
        assert!(args.verbose);
        assert!(matches!(
            args.command,
            Command::Extract {
                rename: true,
                concurrency: Some(4),
                timeout_ms: None
            }
        ));

        let args = Args::parse_from(["pdfstat", "merge", "labels.json", "--output", "out"]);
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert!(matches!(args.command, Command::Merge { annotations: Some(_) }));
    }

    #[test]
    fn test_rejects_unknown_subcommand() {
        assert!(Args::try_parse_from(["pdfstat", "render"]).is_err());
    }
}
