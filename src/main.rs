// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oflcscraper::{
    config::PipelineConfig,
    fetch::{self, DownloadOutcome},
    index::{self, IndexEntry},
    logging,
    process::assemble,
};
use std::path::PathBuf;
use tokio::{task, time::Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "oflcscraper", version, about = "OFLC labor disclosure data pipeline")]
struct Cli {
    /// YAML configuration file; built-in defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the disclosure page and write the index
    Index,
    /// Download and convert every indexed file
    Download {
        /// Comma-separated programs, overriding `programs` from the config
        #[arg(long, value_delimiter = ',')]
        programs: Option<Vec<String>>,
    },
    /// Build one long-format table per program from the raw CSVs
    Assemble {
        /// Comma-separated programs, overriding `programs_process` from the config
        #[arg(long, value_delimiter = ',')]
        programs: Option<Vec<String>>,
    },
    /// Index, download and assemble, in that order
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    config.ensure_dirs()?;
    let _guard = logging::init_logging(config.log_path().as_deref())?;
    info!(data_dir = %config.data_root().display(), "startup");

    let start = Instant::now();
    match cli.command {
        Commands::Index => {
            run_index(&config).await?;
        }
        Commands::Download { programs } => {
            if let Some(programs) = programs {
                config.programs = programs;
            }
            run_download(&config).await?;
        }
        Commands::Assemble { programs } => {
            if let Some(programs) = programs {
                config.programs_process = programs;
            }
            run_assemble(&config).await?;
        }
        Commands::Run => {
            run_index(&config).await?;
            run_download(&config).await?;
            run_assemble(&config).await?;
        }
    }

    info!(elapsed = ?start.elapsed(), "all done");
    Ok(())
}

async fn run_index(config: &PipelineConfig) -> Result<Vec<IndexEntry>> {
    let client = fetch::http_client(config)?;
    let entries = fetch::build_index(&client, config).await?;
    index::write_index(&entries, &config.index_path())?;

    println!("\nIndex Creation Summary:");
    for summary in index::summarize(&entries) {
        println!("\n{summary}");
    }
    println!("\nTotal files indexed: {}", entries.len());
    Ok(entries)
}

async fn run_download(config: &PipelineConfig) -> Result<Vec<DownloadOutcome>> {
    let path = config.index_path();
    let entries: Vec<IndexEntry> = index::read_index(&path)
        .with_context(|| format!("loading index {}; run `index` first", path.display()))?
        .into_iter()
        .filter(|e| config.programs.contains(&e.program))
        .collect();
    info!(path = %path.display(), files = entries.len(), "loaded index");

    let client = fetch::http_client(config)?;
    let outcomes = fetch::download_all(&client, entries, config).await?;
    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        warn!(failed, "some downloads failed; rerun `download` to retry");
    }
    Ok(outcomes)
}

async fn run_assemble(config: &PipelineConfig) -> Result<()> {
    let config = config.clone();
    let reports = task::spawn_blocking(move || assemble::assemble_all(&config))
        .await
        .context("assembly task panicked")??;
    for report in &reports {
        info!(
            program = %report.program,
            rows = report.total_rows(),
            years = report.year_rows.len(),
            skipped = report.skipped.len(),
            "assembled"
        );
    }
    Ok(())
}
