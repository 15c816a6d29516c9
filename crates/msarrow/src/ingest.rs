//! Parquet files as insert sources.
//!
//! A file is opened with only the columns its destination table has, minus
//! any excluded ones, and decoded lazily so batches flow straight into the
//! INSERT path. Directories are walked depth-first in name order; each file
//! is independent and can be handed to [`crate::fan_out`] as one work item.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use arrow::datatypes::Schema;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use tracing::debug;

use crate::config::ParquetOptions;
use crate::error::Result;

/// Open `path` for reading the columns that `target` shares with the file.
///
/// File columns are matched to target columns case-insensitively; columns
/// listed in `opts.exclude_columns` are never decoded.
pub fn open_parquet(path: &Path, target: &Schema, opts: &ParquetOptions) -> Result<ParquetRecordBatchReader> {
    opts.validate()?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let roots: Vec<usize> = builder
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !opts.excludes(f.name()))
        .filter(|(_, f)| target.fields().iter().any(|t| t.name().eq_ignore_ascii_case(f.name())))
        .map(|(i, _)| i)
        .collect();
    debug!(
        path = %path.display(),
        columns = roots.len(),
        row_groups = builder.metadata().num_row_groups(),
        "opening parquet file"
    );
    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    Ok(builder
        .with_projection(mask)
        .with_batch_size(opts.batch_rows)
        .build()?)
}

/// Non-empty files under `dir`, in a stable order.
///
/// Subdirectories are descended into when `opts.recursive` is set. A
/// missing `dir` yields no files when `opts.allow_not_found` is set.
pub fn parquet_files(dir: &Path, opts: &ParquetOptions) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    match collect_files(dir, opts.recursive, &mut files) {
        Err(e) if opts.allow_not_found && e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
        Ok(()) => Ok(files),
    }
}

fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let meta = entry.metadata()?;
        if meta.is_dir() {
            if recursive {
                collect_files(&entry.path(), true, out)?;
            }
        } else if meta.is_file() && meta.len() > 0 {
            out.push(entry.path());
        }
    }
    Ok(())
}
