// src/process/write.rs
use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, instrument};

use super::RawTable;

/// Rows per Arrow record batch when writing Parquet.
const PARQUET_BATCH_ROWS: usize = 65_536;

/// Sibling `<name>.tmp` used while a file is being written.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    Ok(())
}

/// Move a fully written temporary file into place.
pub(crate) fn finish(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            tmp.display(),
            path.display()
        )
    })
}

/// Write `table` as comma-delimited text with a header row, no index column.
/// Nulls are written as empty cells. The file appears atomically.
#[instrument(level = "debug", skip(table), fields(path = %path.display(), rows = table.num_rows()))]
pub fn write_csv(table: &RawTable, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);

    let file = File::create(&tmp)
        .with_context(|| format!("could not create temporary file `{}`", tmp.display()))?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    wtr.write_record(&table.headers)
        .with_context(|| format!("writing header to {}", tmp.display()))?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))
            .with_context(|| format!("writing row to {}", tmp.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", tmp.display()))?;
    drop(wtr);

    finish(&tmp, path)?;
    debug!("wrote csv");
    Ok(())
}

/// Write `table` as Snappy-compressed Parquet, every column a nullable string.
#[instrument(level = "debug", skip(table), fields(path = %path.display(), rows = table.num_rows()))]
pub fn write_parquet(table: &RawTable, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);

    let schema = Arc::new(Schema::new(
        table
            .headers
            .iter()
            .map(|h| Field::new(h, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let file = File::create(&tmp)
        .with_context(|| format!("could not create temporary file `{}`", tmp.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), schema.clone(), Some(props))
        .context("creating ArrowWriter")?;

    for chunk in table.rows.chunks(PARQUET_BATCH_ROWS) {
        let columns: Vec<ArrayRef> = (0..table.num_columns())
            .map(|i| {
                Arc::new(chunk.iter().map(|r| r[i].as_deref()).collect::<StringArray>()) as ArrayRef
            })
            .collect();
        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("building record batch")?;
        writer.write(&batch).context("writing record batch")?;
    }
    writer.close().context("closing ArrowWriter")?;

    finish(&tmp, path)?;
    debug!("wrote parquet");
    Ok(())
}
