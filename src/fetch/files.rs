// src/fetch/files.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use url::Url;

use crate::index::IndexEntry;

/// Where the spreadsheet for `entry` is saved: `<raw>/<PROGRAM>/<year>_<PROGRAM>.xlsx`.
pub fn destination(raw_dir: &Path, entry: &IndexEntry) -> PathBuf {
    raw_dir
        .join(&entry.program)
        .join(format!("{}_{}.xlsx", entry.year, entry.program))
}

/// Resolve an index link, relative or absolute, against the download base.
pub fn resolve_link(base: &Url, link: &str) -> Result<Url> {
    base.join(link)
        .with_context(|| format!("cannot resolve link {link} against {base}"))
}

/// Download `url` to `dest`, creating the parent directory.
/// Returns the number of bytes written.
pub async fn download_file(
    client: &Client,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<usize> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let bytes = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()
        .with_context(|| format!("downloading {url}"))?
        .bytes()
        .await
        .with_context(|| format!("reading body of {url}"))?;
    fs::write(dest, &bytes)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(link: &str) -> IndexEntry {
        IndexEntry {
            year: 2021,
            program: "H-2A".to_string(),
            link: link.to_string(),
        }
    }

    #[test]
    fn destination_is_named_by_year_and_program() {
        let dest = destination(Path::new("/data/raw"), &entry("/x.xlsx"));
        assert_eq!(dest, PathBuf::from("/data/raw/H-2A/2021_H-2A.xlsx"));
    }

    #[test]
    fn links_resolve_against_base() -> Result<()> {
        let base = Url::parse("https://www.dol.gov/")?;
        let rel = resolve_link(&base, "/sites/dolgov/files/ETA/oflc/pdfs/PERM_FY2020.xlsx")?;
        assert_eq!(
            rel.as_str(),
            "https://www.dol.gov/sites/dolgov/files/ETA/oflc/pdfs/PERM_FY2020.xlsx"
        );
        let abs = resolve_link(&base, "https://files.example.org/LCA_FY2020.xlsx")?;
        assert_eq!(abs.host_str(), Some("files.example.org"));
        Ok(())
    }
}
