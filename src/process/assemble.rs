// src/process/assemble.rs
use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

use super::normalize::{NormalizeReport, Normalizer};
use super::utils::extract_year_from_filename;
use super::write::{write_csv, write_parquet};
use super::{load_csv, RawTable};
use crate::config::PipelineConfig;
use crate::schema::columns::PROGRAM;

/// Per-program tally of what went into the consolidated table.
#[derive(Debug, Default)]
pub struct AssembleReport {
    pub program: String,
    /// `(year, rows)` in the order the files were appended.
    pub year_rows: Vec<(u16, usize)>,
    /// Normalizer reports for the appended years, in the same order.
    pub batches: Vec<NormalizeReport>,
    /// Files left out, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

impl AssembleReport {
    pub fn total_rows(&self) -> usize {
        self.year_rows.iter().map(|(_, n)| n).sum()
    }
}

/// Every `*.csv` directly under `dir`, sorted by file name.
/// A missing directory is logged and yields nothing.
pub fn list_year_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "program directory not found");
        return Ok(Vec::new());
    }
    let pattern = format!("{}/*.csv", dir.display());
    let mut files: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("bad glob pattern {pattern}"))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "unreadable directory entry");
                None
            }
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Normalize every year file for `program` and stack them in file order.
///
/// Bad inputs never fail the run: files without a year, unreadable files and
/// batches with alias conflicts are skipped and recorded in the report.
#[instrument(level = "info", skip(files, normalizer, null_markers), fields(files = files.len()))]
pub fn assemble(
    program: &str,
    files: &[PathBuf],
    normalizer: &Normalizer<'_>,
    null_markers: &[String],
) -> (RawTable, AssembleReport) {
    let mut combined = RawTable::new(normalizer.schema().output_columns());
    let mut report = AssembleReport {
        program: program.to_string(),
        ..AssembleReport::default()
    };

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(year) = extract_year_from_filename(&name) else {
            warn!(file = %name, "no year in file name, skipping");
            report.skipped.push((path.clone(), "no year in file name".into()));
            continue;
        };

        let mut batch = match load_csv(path, null_markers) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{e:#}"), "could not read file, skipping");
                report.skipped.push((path.clone(), format!("{e:#}")));
                continue;
            }
        };
        batch.drop_empty_rows();
        batch.fill_column(PROGRAM, Some(program));

        let normalized = match normalizer.normalize(batch, year, program) {
            Ok(n) => n,
            Err(e) => {
                error!(program, year, error = %e, "skipping year");
                report.skipped.push((path.clone(), e.to_string()));
                continue;
            }
        };

        let missing: Vec<&str> = normalized.report.missing_columns().collect();
        info!(
            program,
            year,
            rows = normalized.table.num_rows(),
            columns = normalized.table.num_columns(),
            missing = ?missing,
            "processed year"
        );

        report.year_rows.push((year, normalized.table.num_rows()));
        // every batch is projected onto the same output columns
        if let Err(e) = combined.append(normalized.table) {
            error!(program, year, error = %e, "skipping year");
            report.skipped.push((path.clone(), e.to_string()));
            report.year_rows.pop();
            continue;
        }
        report.batches.push(normalized.report);
    }

    (combined, report)
}

/// Build and write the consolidated table for one program.
pub fn assemble_program(config: &PipelineConfig, program: &str) -> Result<AssembleReport> {
    let dir = config.program_raw_dir(program);
    let files = list_year_files(&dir)?;
    let normalizer = Normalizer::from_config(config);
    let (table, report) = assemble(program, &files, &normalizer, &config.null_markers);

    let out = config.processed_path(program);
    write_csv(&table, &out)
        .with_context(|| format!("writing consolidated data for {program}"))?;
    if config.write_parquet {
        let pq = out.with_extension("parquet");
        write_parquet(&table, &pq)
            .with_context(|| format!("writing parquet copy for {program}"))?;
    }

    info!(
        program,
        path = %out.display(),
        rows = table.num_rows(),
        columns = table.num_columns(),
        column_names = %table.headers.join(", "),
        "saved consolidated data"
    );
    for batch in &report.batches {
        info!(
            program,
            year = batch.year,
            rows = batch.rows_out,
            coercion_failures = batch.coercion_failures,
            worker_count_anomalies = batch.worker_count_anomalies,
            "rows per year"
        );
    }
    if !report.skipped.is_empty() {
        warn!(program, skipped = report.skipped.len(), "some files were skipped");
    }
    Ok(report)
}

/// Assemble every program listed for processing.
pub fn assemble_all(config: &PipelineConfig) -> Result<Vec<AssembleReport>> {
    config
        .programs_process
        .iter()
        .map(|program| assemble_program(config, program))
        .collect()
}
