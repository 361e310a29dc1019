// src/fetch/pool.rs
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::Semaphore,
    task::{self, JoinSet},
    time::Instant,
};
use tracing::{error, info, warn};
use url::Url;

use super::files::{destination, download_file, resolve_link};
use crate::config::PipelineConfig;
use crate::convert::convert_workbook;
use crate::index::IndexEntry;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Path of the converted CSV.
    Success(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub entry: IndexEntry,
    pub status: DownloadStatus,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, DownloadStatus::Success(_))
    }
}

/// Run `task` over every item with at most `workers` running at once.
/// Results come back in completion order.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, workers: usize, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for item in items {
        let sem = sem.clone();
        let fut = task(item);
        set.spawn(async move {
            // the semaphore is never closed
            let _permit = sem.acquire().await;
            fut.await
        });
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(res) = set.join_next().await {
        match res {
            Ok(r) => results.push(r),
            Err(e) => error!(error = %e, "worker task failed"),
        }
    }
    results
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Download one entry, convert it to CSV next to the spreadsheet and delete
/// the spreadsheet. A spreadsheet that fails to convert is left on disk.
async fn fetch_and_convert(
    client: &Client,
    base: &Url,
    raw_dir: &Path,
    entry: &IndexEntry,
    timeout: Duration,
) -> Result<PathBuf> {
    let url = resolve_link(base, &entry.link)?;
    let sheet = destination(raw_dir, entry);

    let start = Instant::now();
    info!(file = %sheet.display(), "downloading");
    let bytes = download_file(client, url.as_str(), &sheet, timeout).await?;
    info!(file = %sheet.display(), bytes, elapsed = ?start.elapsed(), "downloaded");

    let csv = sheet.with_extension("csv");
    let rows = task::spawn_blocking({
        let (src, dst) = (sheet.clone(), csv.clone());
        move || convert_workbook(&src, &dst)
    })
    .await
    .context("conversion task panicked")??;
    info!(file = %csv.display(), rows, "converted");

    tokio::fs::remove_file(&sheet)
        .await
        .with_context(|| format!("deleting {}", sheet.display()))?;
    Ok(csv)
}

/// Download and convert every entry through a pool of
/// `config.download_workers` tasks. Individual failures are returned as
/// [`DownloadStatus::Failed`], never as an error.
pub async fn download_all(
    client: &Client,
    entries: Vec<IndexEntry>,
    config: &PipelineConfig,
) -> Result<Vec<DownloadOutcome>> {
    let base = Url::parse(&config.download_base_url)
        .with_context(|| format!("invalid download base {}", config.download_base_url))?;
    let raw_dir = config.raw_dir();
    let timeout = config.download_timeout();

    info!(
        files = entries.len(),
        workers = config.download_workers,
        "starting downloads"
    );
    let pb = progress_bar(entries.len());

    let outcomes = run_bounded(entries, config.download_workers, |entry| {
        let client = client.clone();
        let base = base.clone();
        let raw_dir = raw_dir.clone();
        let pb = pb.clone();
        async move {
            let status = match fetch_and_convert(&client, &base, &raw_dir, &entry, timeout).await {
                Ok(csv) => DownloadStatus::Success(csv),
                Err(e) => {
                    error!(link = %entry.link, error = %format!("{e:#}"), "download failed");
                    DownloadStatus::Failed(format!("{e:#}"))
                }
            };
            pb.set_message(entry.program.clone());
            pb.inc(1);
            DownloadOutcome { entry, status }
        }
    })
    .await;
    pb.finish_with_message("done");

    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| destination(&raw_dir, &o.entry).display().to_string())
        .collect();
    info!(
        succeeded = outcomes.len() - failed.len(),
        failed = failed.len(),
        "downloads finished"
    );
    if !failed.is_empty() {
        warn!(files = ?failed, "files that failed");
    }
    Ok(outcomes)
}
