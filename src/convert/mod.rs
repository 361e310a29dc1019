// src/convert/mod.rs
//! Spreadsheet → CSV conversion for downloaded disclosure files.

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook, Data, Range, Reader, Xls, Xlsx};
use chrono::{NaiveDateTime, Timelike};
use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};
use tracing::{debug, instrument, warn};

use crate::process::write::{finish, tmp_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Xlsx,
    Xls,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xls") => Format::Xls,
            _ => Format::Xlsx,
        }
    }

    fn other(self) -> Self {
        match self {
            Format::Xlsx => Format::Xls,
            Format::Xls => Format::Xlsx,
        }
    }
}

fn first_sheet_as<R>(path: &Path) -> Result<Range<Data>>
where
    R: Reader<BufReader<File>>,
    R::Error: std::error::Error + Send + Sync + 'static,
{
    let mut workbook: R =
        open_workbook(path).with_context(|| format!("opening {}", path.display()))?;
    workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{} has no worksheets", path.display()))?
        .with_context(|| format!("reading first worksheet of {}", path.display()))
}

fn first_sheet(path: &Path, format: Format) -> Result<Range<Data>> {
    match format {
        Format::Xlsx => first_sheet_as::<Xlsx<_>>(path),
        Format::Xls => first_sheet_as::<Xls<_>>(path),
    }
}

/// Render a date-time cell; the time is only shown when it is not midnight.
pub fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.time().num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Text for one cell. Empty and error cells render as an empty string.
pub fn render_cell(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(true) => "TRUE".to_string(),
        Data::Bool(false) => "FALSE".to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(format_datetime)
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

fn write_range(range: &Range<Data>, dst: &Path) -> Result<usize> {
    let mut wtr =
        csv::Writer::from_path(dst).with_context(|| format!("creating {}", dst.display()))?;
    let mut rows = 0;
    for row in range.rows() {
        wtr.write_record(row.iter().map(render_cell))
            .with_context(|| format!("writing row {rows} to {}", dst.display()))?;
        rows += 1;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", dst.display()))?;
    Ok(rows)
}

/// Write through a temporary sibling so `dst` only ever holds a complete file.
fn write_range_atomic(range: &Range<Data>, dst: &Path) -> Result<usize> {
    let tmp = tmp_path(dst);
    let rows = match write_range(range, &tmp) {
        Ok(rows) => rows,
        Err(e) => {
            if let Err(rm) = fs::remove_file(&tmp) {
                debug!(tmp = %tmp.display(), error = %rm, "no partial file to remove");
            }
            return Err(e);
        }
    };
    finish(&tmp, dst)?;
    Ok(rows)
}

/// Convert the first worksheet of `src` to CSV at `dst` and return the number
/// of rows written. If the format implied by the extension cannot be read,
/// the other spreadsheet format is tried before giving up.
#[instrument(level = "debug", fields(src = %src.display()), skip(src, dst))]
pub fn convert_workbook(src: &Path, dst: &Path) -> Result<usize> {
    let preferred = Format::from_path(src);
    let range = match first_sheet(src, preferred) {
        Ok(range) => range,
        Err(first) => {
            warn!(error = %format!("{first:#}"), format = ?preferred, "retrying with other format");
            first_sheet(src, preferred.other()).map_err(|second| {
                anyhow!(
                    "could not read {} as {:?} ({:#}) or {:?} ({:#})",
                    src.display(),
                    preferred,
                    first,
                    preferred.other(),
                    second
                )
            })?
        }
    };

    let rows = write_range_atomic(&range, dst)?;
    debug!(rows, dst = %dst.display(), "wrote csv");
    Ok(rows)
}
