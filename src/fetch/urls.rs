// src/fetch/urls.rs
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::index::IndexEntry;

/// Applied in order to the last path segment of a link.
static LINK_REPLACEMENTS: &[(&str, &str)] = &[
    ("PWD", "PW"),
    ("Case_Data", "Disclosure_Data"),
    ("_revised_form", ""),
    ("iCert_LCA", ""),
    ("Data", ""),
    ("_EOY", ""),
    ("_updated", ""),
    (".xlsx", ""),
    (".xls", ""),
];

/// Oldest fiscal year kept in the index.
pub const MIN_YEAR: u16 = 2010;

static VISA_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"H(\d)([A-Z])").expect("visa class regex should parse"));
static FISCAL_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FY(\d{4}|\d{2})").expect("fiscal year regex should parse"));
static FISCAL_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FY\d{4}|FY\d{2}").expect("fiscal tag regex should parse"));
static QUARTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_Q(\d)").expect("quarter regex should parse"));

/// Normalize a file name from the disclosure page, e.g.
/// `H1B_Disclosure_Data_FY15.xlsx` → `H-1B_Disclosure__FY15`.
pub fn clean_link_text(text: &str) -> String {
    let mut text = text.to_string();
    for (old, new) in LINK_REPLACEMENTS {
        text = text.replace(old, new);
    }
    let text = VISA_CLASS_RE.replace_all(&text, "H-$1$2");
    text.split_whitespace().collect::<Vec<_>>().join("_")
}

/// First `FY` tag in `href`. Two-digit years are read as 20xx.
pub fn extract_fiscal_year(href: &str) -> Option<u16> {
    let digits = FISCAL_YEAR_RE.captures(href)?.get(1)?.as_str();
    let year: u16 = digits.parse().ok()?;
    Some(if digits.len() == 2 { 2000 + year } else { year })
}

/// Turn one link into an index entry, or `None` when it is not an annual
/// disclosure spreadsheet for a program we track.
pub fn classify_link(href: &str) -> Option<IndexEntry> {
    if !(href.ends_with(".xlsx") || href.ends_with(".xls")) {
        return None;
    }

    let file_name = href.rsplit('/').next().unwrap_or(href);
    let text = clean_link_text(file_name);
    let mut parts = text.split('_');
    let program = match parts.next()? {
        "CW-1" => return None,
        "H-1B" => "LCA",
        other => other,
    };

    let year = extract_fiscal_year(href).filter(|y| *y >= MIN_YEAR)?;

    let rest = parts.collect::<Vec<_>>().join("_");
    let mut rest = FISCAL_TAG_RE.replace_all(&rest, "").into_owned();
    if let Some(quarter) = QUARTER_RE.captures(href).and_then(|c| c.get(1)) {
        if quarter.as_str() != "4" {
            return None;
        }
        rest = rest.replace(&format!("Q{}", quarter.as_str()), "");
    }
    let rest = rest.replace('_', "");

    if !(rest == "Disclosure" || rest.is_empty()) {
        debug!(href, remainder = %rest, "not a disclosure file");
        return None;
    }

    Some(IndexEntry {
        year,
        program: program.to_string(),
        link: href.to_string(),
    })
}

/// Every classified `<a href>` on the page, in document order.
pub fn scrape_links(html: &str) -> Vec<IndexEntry> {
    let selector = Selector::parse("a[href]").expect("CSS selector for links should be valid");
    Html::parse_document(html)
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(classify_link)
        .collect()
}

/// Download the disclosure page and classify its links.
#[instrument(level = "info", skip(client))]
pub async fn fetch_index(client: &Client, url: &str) -> Result<Vec<IndexEntry>> {
    let html = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()
        .with_context(|| format!("fetching {url}"))?
        .text()
        .await
        .with_context(|| format!("reading body of {url}"))?;

    let entries = scrape_links(&html);
    info!(links = entries.len(), "found valid links");
    Ok(entries)
}

pub async fn build_index(client: &Client, config: &PipelineConfig) -> Result<Vec<IndexEntry>> {
    info!("starting index creation");
    fetch_index(client, &config.scrape_url).await
}
