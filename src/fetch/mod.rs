// src/fetch/mod.rs
use anyhow::{Context, Result};
use reqwest::Client;

use crate::config::PipelineConfig;

pub mod files;
pub mod pool;
pub mod urls;

pub use pool::{download_all, DownloadOutcome, DownloadStatus};
pub use urls::{build_index, classify_link};

/// Shared HTTP client for scraping and downloads.
pub fn http_client(config: &PipelineConfig) -> Result<Client> {
    Client::builder()
        .cookie_store(true)
        .gzip(true)
        .connect_timeout(config.download_timeout())
        .build()
        .context("building HTTP client")
}
