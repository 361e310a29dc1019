// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::schema::{AliasConflictPolicy, AliasMap, CanonicalSchema, SpecialCaseRules};

/// Everything the pipeline stages need, passed explicitly to each of them.
///
/// Every field has a default, so a YAML file only needs the keys it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root that every relative path below is resolved against.
    pub base_dir: PathBuf,
    /// Shared data directory holding `raw/` and `processed/`.
    pub data_dir: PathBuf,
    /// Log file, relative to `base_dir`. `None` logs to the console only.
    pub log_file: Option<PathBuf>,

    /// Page listing the disclosure files.
    pub scrape_url: String,
    /// Base every scraped link is resolved against before downloading.
    pub download_base_url: String,
    pub download_workers: usize,
    pub download_timeout_secs: u64,

    /// Programs fetched by the downloader.
    pub programs: Vec<String>,
    /// Programs consolidated by the assembler.
    pub programs_process: Vec<String>,

    /// `{program}` is replaced with the program label.
    pub processed_file_template: String,
    /// Also write a Parquet copy next to every consolidated CSV.
    pub write_parquet: bool,
    /// Cell spellings read as null in raw files.
    pub null_markers: Vec<String>,

    pub schema: CanonicalSchema,
    pub aliases: AliasMap,
    pub rules: SpecialCaseRules,
    pub alias_conflicts: AliasConflictPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            data_dir: PathBuf::from("shared_data/oflc_performance_data"),
            log_file: Some(PathBuf::from("shared_data/oflc_performance_data/pipeline.log")),
            scrape_url: "https://www.dol.gov/agencies/eta/foreign-labor/performance#dis".into(),
            download_base_url: "https://www.dol.gov/".into(),
            download_workers: 10,
            download_timeout_secs: 30,
            programs: ["LCA", "PERM", "H-2A", "H-2B"].map(String::from).to_vec(),
            programs_process: ["LCA", "PERM"].map(String::from).to_vec(),
            processed_file_template: "{program}_long.csv".into(),
            write_parquet: false,
            null_markers: default_null_markers(),
            schema: CanonicalSchema::default(),
            aliases: AliasMap::default(),
            rules: SpecialCaseRules::default(),
            alias_conflicts: AliasConflictPolicy::default(),
        }
    }
}

/// Spellings of a missing value found in published disclosure exports.
fn default_null_markers() -> Vec<String> {
    [
        "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
        "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
    ]
    .map(String::from)
    .to_vec()
}

impl PipelineConfig {
    /// Load from a YAML file, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        anyhow::ensure!(
            config.download_workers > 0,
            "download_workers must be at least 1"
        );
        Ok(config)
    }

    pub fn data_root(&self) -> PathBuf {
        self.base_dir.join(&self.data_dir)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_root().join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_root().join("processed")
    }

    pub fn index_path(&self) -> PathBuf {
        self.raw_dir().join("index.csv")
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.as_ref().map(|f| self.base_dir.join(f))
    }

    /// Directory holding one CSV per year for `program`.
    pub fn program_raw_dir(&self, program: &str) -> PathBuf {
        self.raw_dir().join(program)
    }

    /// Consolidated output for `program`.
    pub fn processed_path(&self, program: &str) -> PathBuf {
        self.processed_dir()
            .join(self.processed_file_template.replace("{program}", program))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Create the raw and processed directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.raw_dir(), self.processed_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}
