//! ceiling-scan - ceiling-event scanner CLI.
//!
//! Scans a symbol universe, trains the prediction ensemble from provider
//! history, and reports provider health.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ceiling_common::config::{parse_symbol_list, Config};
use ceiling_common::logging::init_logging_with_exclusions;
use ceiling_engine::scanner::ReportFormat;
use ceiling_engine::{parse_preset, CeilingService};

#[derive(Parser, Debug)]
#[command(name = "ceiling-scan")]
#[command(version)]
#[command(about = "Scan equities for next-session ceiling events", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.ceiling/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the universe and print or save a ranked report
    Scan {
        /// Scorer preset (momentum_v2, volume_revolution)
        #[arg(long)]
        preset: Option<String>,

        /// Report format: json or markdown
        #[arg(long, default_value = "markdown")]
        format: ReportFormat,

        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// News sentiment in [0, 1]
        #[arg(long)]
        sentiment: Option<f64>,

        /// Comma-separated symbols overriding the configured universe
        #[arg(long)]
        symbols: Option<String>,
    },

    /// Train the prediction ensemble from provider history
    Train {
        /// Comma-separated symbols (defaults to the configured universe)
        #[arg(long)]
        symbols: Option<String>,
    },

    /// Health-check every configured provider
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();
    let cli = Cli::parse();

    let config = Config::load_with_env(cli.config.as_deref())?;
    config.validate().context("Invalid configuration")?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("ceiling-scan v{}", env!("CARGO_PKG_VERSION"));

    let service = CeilingService::from_config(config).await?;
    tracing::info!(
        duration_ms = startup_start.elapsed().as_millis() as u64,
        "Service initialized"
    );

    match cli.command {
        Commands::Scan {
            preset,
            format,
            output,
            sentiment,
            symbols,
        } => {
            if let Some(preset) = preset.as_deref() {
                parse_preset(preset)?;
            }
            if let Some(s) = sentiment {
                anyhow::ensure!((0.0..=1.0).contains(&s), "sentiment must be in [0, 1]");
            }
            let universe = symbols.as_deref().map(parse_symbol_list).unwrap_or_default();

            let report = service.scan(&universe, preset.as_deref(), sentiment).await?;
            match output {
                Some(path) => {
                    let written = report.save_to_file(&path, format)?;
                    tracing::info!(path = %written.display(), "Report written");
                }
                None => println!("{}", report.render(format)),
            }
        }
        Commands::Train { symbols } => {
            let symbols = symbols.as_deref().map(parse_symbol_list).unwrap_or_default();
            let report = service.train(&symbols).await?;
            println!(
                "Trained on {} samples ({} positive): forest {:.1}%, boosting {:.1}%, ensemble {:.1}%",
                report.samples,
                report.positives,
                report.forest_accuracy * 100.0,
                report.boosting_accuracy * 100.0,
                report.ensemble_accuracy * 100.0
            );
            println!("Model saved under {}", service.model_dir().display());
        }
        Commands::Providers => {
            let providers = service.check_providers().await;
            if providers.is_empty() {
                println!("No providers configured");
            }
            for p in providers {
                let limit = p
                    .rate_limit
                    .map(|(calls, window)| format!("{calls}/{window}s"))
                    .unwrap_or_else(|| "unlimited".to_string());
                println!(
                    "{:<16} priority={} healthy={} limit={} requests={} errors={}{}",
                    p.name,
                    p.priority,
                    p.healthy,
                    limit,
                    p.request_count,
                    p.error_count,
                    p.last_error
                        .map(|e| format!(" last_error=\"{e}\""))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
