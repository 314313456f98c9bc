use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jobscout_sync::{PipelineConfig, RunHandle, RunStatus, ScoutPipeline};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "jobscout")]
#[command(about = "Scrape configured job boards into a deduplicated posting collection")]
struct Cli {
    /// Config file; overrides JOBSCOUT_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape every enabled board once and update the collection.
    Run,
    /// Check that every enabled board answers.
    Check,
    /// List configured boards and the adapter each resolves to.
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jobscout_cli=info,jobscout_sync=info,jobscout_adapters=info,jobscout_storage=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();
    if let Some(path) = cli.config {
        config.config_path = path;
    }
    let pipeline = ScoutPipeline::new(config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(pipeline).await?,
        Commands::Check => check(&pipeline).await?,
        Commands::Sources => sources(&pipeline),
    }

    Ok(())
}

async fn run(pipeline: ScoutPipeline) -> Result<()> {
    let handle = RunHandle::spawn(Arc::new(pipeline));
    let mut updates = handle.subscribe();
    while updates.changed().await.is_ok() {
        let status = updates.borrow_and_update().clone();
        if let RunStatus::Running { current_source, completed, total } = &status {
            info!(source = %current_source, "[{}/{}] scraping", completed + 1, total);
        }
        if status.is_finished() {
            break;
        }
    }

    match handle.wait().await {
        RunStatus::Completed(summary) => {
            println!(
                "run complete: run_id={} sources={} scraped={} new={} total={} pruned={} recent_24h={} output={}",
                summary.run_id,
                summary.enabled_sources,
                summary.scraped_postings,
                summary.new_postings,
                summary.total_postings,
                summary.pruned_postings,
                summary.recent_postings,
                summary.output_file
            );
            for source in summary.sources.iter().filter(|s| s.error.is_some()) {
                eprintln!(
                    "  {} ({}) failed: {}",
                    source.name,
                    source.kind,
                    source.error.as_deref().unwrap_or_default()
                );
            }
            Ok(())
        }
        RunStatus::Failed(message) => bail!("scrape run failed: {message}"),
        other => bail!("scrape run ended in state {other:?}"),
    }
}

async fn check(pipeline: &ScoutPipeline) -> Result<()> {
    let reports = pipeline.probe_sources().await;
    if reports.is_empty() {
        println!("no enabled sources in {}", pipeline.config().config_path.display());
        return Ok(());
    }

    let mut unreachable = 0usize;
    for report in &reports {
        let outcome = match (report.status, report.error.as_deref()) {
            (Some(status), _) => status.to_string(),
            (None, Some(err)) => format!("error: {err}"),
            (None, None) => "no response".to_string(),
        };
        if !report.reachable() {
            unreachable += 1;
        }
        println!("{:<28} {:<10} {:<24} {}", report.name, report.kind, outcome, report.url);
    }
    println!("{} of {} sources reachable", reports.len() - unreachable, reports.len());
    Ok(())
}

fn sources(pipeline: &ScoutPipeline) {
    let scout = pipeline.load_config();
    if scout.job_boards.is_empty() {
        println!("no sources in {}", pipeline.config().config_path.display());
        return;
    }
    for source in &scout.job_boards {
        println!(
            "{:<28} {:<10} {:<8} {}",
            source.name,
            source.adapter_kind(),
            if source.enabled { "enabled" } else { "disabled" },
            source.url
        );
    }
    println!(
        "output: {}  dedupe: {}  max_age_days: {}",
        pipeline.output_path(&scout).display(),
        scout.settings.dedupe,
        scout
            .settings
            .max_age_days
            .map(|d| d.to_string())
            .unwrap_or_else(|| "off".to_string())
    );
}
