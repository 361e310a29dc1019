// src/process/mod.rs
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{collections::HashSet, fs::File, io::BufReader, path::Path};
use tracing::{debug, instrument};

use crate::error::HarmonizeError;

pub mod assemble;
pub mod normalize;
pub mod utils;
pub mod write;

/// One delimited table held in memory, row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names, as published or as renamed by the normalizer.
    pub headers: Vec<String>,
    /// One entry per header in every row; `None` is a missing value.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Build from string cells, reading empty strings as null.
    pub fn from_rows<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let headers: Vec<String> = headers.into_iter().map(Into::into).collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut cells: Vec<Option<String>> = row
                    .into_iter()
                    .map(|c| Some(c.as_ref()).filter(|s| !s.is_empty()).map(str::to_string))
                    .collect();
                cells.resize(width, None);
                cells
            })
            .collect();
        Self { headers, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.headers.len()
    }

    /// Position of the first column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows.iter().map(move |r| r[idx].as_deref())
    }

    /// Values of the first column called `name`.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        self.column_index(name)
            .map(|idx| self.column_values(idx).collect())
    }

    /// Set every cell of `name` to `value`, appending the column if absent.
    pub fn fill_column(&mut self, name: &str, value: Option<&str>) {
        let targets: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.as_str() == name)
            .map(|(i, _)| i)
            .collect();

        if targets.is_empty() {
            self.headers.push(name.to_string());
            for row in &mut self.rows {
                row.push(value.map(str::to_string));
            }
            return;
        }
        for row in &mut self.rows {
            for &i in &targets {
                row[i] = value.map(str::to_string);
            }
        }
    }

    /// Remove the columns at `indices` (any order, duplicates ignored).
    pub fn remove_columns(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let drop: HashSet<usize> = indices.iter().copied().collect();
        let keep: Vec<usize> = (0..self.headers.len()).filter(|i| !drop.contains(i)).collect();
        self.headers = keep.iter().map(|&i| self.headers[i].clone()).collect();
        for row in &mut self.rows {
            let old = std::mem::take(row);
            *row = old
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !drop.contains(i))
                .map(|(_, v)| v)
                .collect();
        }
    }

    /// Drop every column whose name satisfies `pred`; returns the dropped names.
    pub fn drop_columns<F>(&mut self, pred: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let indices: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| pred(h))
            .map(|(i, _)| i)
            .collect();
        let names = indices.iter().map(|&i| self.headers[i].clone()).collect();
        self.remove_columns(&indices);
        names
    }

    /// Remove rows where every cell is null; returns how many were removed.
    pub fn drop_empty_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| r.iter().any(Option::is_some));
        before - self.rows.len()
    }

    /// Restrict and reorder to `columns`; absent columns come back all-null.
    pub fn project(&self, columns: &[String]) -> RawTable {
        let sources: Vec<Option<usize>> = columns.iter().map(|c| self.column_index(c)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.and_then(|i| row[i].clone()))
                    .collect()
            })
            .collect();
        RawTable {
            headers: columns.to_vec(),
            rows,
        }
    }

    /// Concatenate `other` below `self`; both must share the same headers.
    pub fn append(&mut self, other: RawTable) -> Result<(), HarmonizeError> {
        if self.headers.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.headers != other.headers {
            return Err(HarmonizeError::ShapeMismatch {
                expected: self.headers.clone(),
                found: other.headers,
            });
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

fn is_null(field: &str, null_markers: &[String]) -> bool {
    field.is_empty() || null_markers.iter().any(|m| m == field)
}

/// Read a delimited file with a header row into a [`RawTable`].
///
/// Empty cells and `null_markers` become null. Rows shorter than the header
/// are padded with nulls, longer rows are truncated. Invalid UTF-8 is
/// replaced rather than rejected.
#[instrument(level = "debug", skip(path, null_markers), fields(path = %path.as_ref().display()))]
pub fn load_csv<P: AsRef<Path>>(path: P, null_markers: &[String]) -> Result<RawTable> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = rdr
        .byte_headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();
    let width = headers.len();

    let mut rows = Vec::new();
    for (idx, result) in rdr.byte_records().enumerate() {
        let record = result
            .with_context(|| format!("CSV parse error in {} at record {}", path.display(), idx))?;
        let mut row: Vec<Option<String>> = record
            .iter()
            .take(width)
            .map(|f| {
                let s = String::from_utf8_lossy(f);
                (!is_null(&s, null_markers)).then(|| s.into_owned())
            })
            .collect();
        row.resize(width, None);
        rows.push(row);
    }

    debug!(rows = rows.len(), columns = width, "loaded csv");
    Ok(RawTable { headers, rows })
}

/// Read only the header row of a delimited file.
pub fn read_headers<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(rdr
        .byte_headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect())
}
