// src/index/mod.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, fs, path::Path};
use tracing::info;

/// One downloadable disclosure file for a program and fiscal year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub year: u16,
    pub program: String,
    pub link: String,
}

/// Persist the index as CSV with header `year,program,link`.
pub fn write_index(entries: &[IndexEntry], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating index file {}", path.display()))?;
    for entry in entries {
        wtr.serialize(entry)
            .with_context(|| format!("writing index entry for {}", entry.link))?;
    }
    wtr.flush()
        .with_context(|| format!("flushing index file {}", path.display()))?;
    info!(path = %path.display(), entries = entries.len(), "index saved");
    Ok(())
}

pub fn read_index(path: &Path) -> Result<Vec<IndexEntry>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening index file {}", path.display()))?;
    rdr.deserialize::<IndexEntry>()
        .enumerate()
        .map(|(i, rec)| {
            rec.with_context(|| format!("bad index record {} in {}", i + 1, path.display()))
        })
        .collect()
}

/// Years and file counts for one program in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSummary {
    pub program: String,
    /// Distinct years, ascending.
    pub years: Vec<u16>,
    pub files: usize,
}

impl ProgramSummary {
    pub fn most_recent(&self) -> Option<u16> {
        self.years.last().copied()
    }

    pub fn oldest(&self) -> Option<u16> {
        self.years.first().copied()
    }
}

impl fmt::Display for ProgramSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.program)?;
        writeln!(f, "  Years available: {:?}", self.years)?;
        writeln!(f, "  Total years: {}", self.years.len())?;
        if let (Some(recent), Some(oldest)) = (self.most_recent(), self.oldest()) {
            writeln!(f, "  Most recent year: {recent}")?;
            writeln!(f, "  Oldest year: {oldest}")?;
        }
        write!(f, "  Number of files: {}", self.files)
    }
}

/// Summaries per program, in order of first appearance.
pub fn summarize(entries: &[IndexEntry]) -> Vec<ProgramSummary> {
    let mut order: Vec<&str> = Vec::new();
    for e in entries {
        if !order.contains(&e.program.as_str()) {
            order.push(&e.program);
        }
    }
    order
        .into_iter()
        .map(|program| {
            let matching: Vec<&IndexEntry> =
                entries.iter().filter(|e| e.program == program).collect();
            let years: BTreeSet<u16> = matching.iter().map(|e| e.year).collect();
            ProgramSummary {
                program: program.to_string(),
                years: years.into_iter().collect(),
                files: matching.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(year: u16, program: &str) -> IndexEntry {
        IndexEntry {
            year,
            program: program.to_string(),
            link: format!("/sites/files/{program}_Disclosure_Data_FY{year}.xlsx"),
        }
    }

    #[test]
    fn index_file_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("raw").join("index.csv");
        let entries = vec![entry(2020, "LCA"), entry(2019, "PERM")];
        write_index(&entries, &path)?;

        let text = fs::read_to_string(&path)?;
        assert!(text.starts_with("year,program,link\n"));
        assert_eq!(read_index(&path)?, entries);
        Ok(())
    }

    #[test]
    fn malformed_index_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("index.csv");
        fs::write(&path, "year,program,link\nsoon,LCA,/x.xlsx\n")?;
        let err = read_index(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad index record 1"));
        Ok(())
    }

    #[test]
    fn summary_groups_by_program_in_first_seen_order() {
        let entries = vec![
            entry(2021, "PERM"),
            entry(2019, "LCA"),
            entry(2015, "PERM"),
            entry(2021, "PERM"),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].program, "PERM");
        assert_eq!(summary[0].years, vec![2015, 2021]);
        assert_eq!(summary[0].files, 3);
        assert_eq!(summary[0].most_recent(), Some(2021));
        assert_eq!(summary[0].oldest(), Some(2015));
        assert!(summary[1].to_string().contains("Number of files: 1"));
    }
}
