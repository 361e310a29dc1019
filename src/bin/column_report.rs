// src/bin/column_report.rs
//! Print, per raw CSV, how each published header maps onto the canonical
//! schema. Output is YAML on stdout.
use anyhow::Result;
use clap::Parser;
use oflcscraper::{
    config::PipelineConfig,
    process::{assemble::list_year_files, read_headers, utils::extract_year_from_filename},
    schema::{resolve_header, ColumnResolution, Resolution},
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(version, about = "Show how raw column headers resolve to canonical columns")]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Programs to report on; defaults to `programs_process`
    #[arg(long, value_delimiter = ',')]
    programs: Option<Vec<String>>,
    /// Only list headers that do not reach the canonical schema
    #[arg(long)]
    unmapped_only: bool,
}

#[derive(Serialize)]
struct FileReport {
    program: String,
    year: Option<u16>,
    file: String,
    missing: Vec<String>,
    columns: Vec<ColumnResolution>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref())?;
    let programs = args.programs.unwrap_or_else(|| config.programs_process.clone());

    let mut reports = Vec::new();
    for program in &programs {
        for path in list_year_files(&config.program_raw_dir(program))? {
            let headers = match read_headers(&path) {
                Ok(h) => h,
                Err(e) => {
                    warn!(file = %path.display(), error = %format!("{e:#}"), "skipping");
                    continue;
                }
            };
            let mut columns: Vec<ColumnResolution> = headers
                .iter()
                .map(|h| resolve_header(h, &config.aliases, &config.schema))
                .collect();
            let missing = config
                .schema
                .columns()
                .into_iter()
                .filter(|c| !columns.iter().any(|r| r.target.as_deref() == Some(*c)))
                .map(str::to_string)
                .collect();
            if args.unmapped_only {
                columns.retain(|r| r.resolution == Resolution::Unmapped);
            }

            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            reports.push(FileReport {
                program: program.clone(),
                year: extract_year_from_filename(&file),
                file,
                missing,
                columns,
            });
        }
    }

    print!("{}", serde_yaml::to_string(&reports)?);
    Ok(())
}
