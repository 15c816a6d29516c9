//! BULK INSERT from staged CSV files.
//!
//! Every call stages its files in a fresh temporary directory. Each batch
//! gets its own randomly named file, deleted as soon as its statement
//! returns; the directory goes when the call does, on any exit path.

use std::path::Path;

use arrow::array::RecordBatch;
use tempfile::{TempDir, TempPath};

use crate::batch::csv_format::{stringify_for_bulk, write_csv, CsvDialect};
use crate::batch::ArrowData;
use crate::config::BulkOptions;
use crate::driver::DatabaseDriver;
use crate::error::Result;
use crate::statement::{bulk_insert_statement, BulkLoadOptions};
use crate::table::TargetTable;

const STAGING_DIR_PREFIX: &str = "msarrow-bulk-";
const STAGED_FILE_PREFIX: &str = "batch-";
const STAGED_FILE_RANDOM_LEN: usize = 8;

/// Everything one bulk call needs, resolved once at entry.
struct BulkContext<'a> {
    table: &'a str,
    dir: TempDir,
    dialect: CsvDialect,
    load: BulkLoadOptions,
}

impl BulkContext<'_> {
    fn stage(&self, batch: &RecordBatch) -> Result<TempPath> {
        let staged = stringify_for_bulk(batch)?;
        let path = tempfile::Builder::new()
            .prefix(STAGED_FILE_PREFIX)
            .rand_bytes(STAGED_FILE_RANDOM_LEN)
            .suffix(".csv")
            .tempfile_in(self.dir.path())?
            .into_temp_path();
        write_csv(&staged, &path, self.dialect)?;
        Ok(path)
    }

    async fn load(&self, driver: &mut dyn DatabaseDriver, batch: &RecordBatch) -> Result<u64> {
        let path = self.stage(batch)?;
        let sql = bulk_insert_statement(self.table, &path.to_string_lossy(), &self.load);
        tracing::debug!(
            table = self.table,
            file = %path.display(),
            rows = batch.num_rows(),
            "bulk loading staged file"
        );
        driver.execute(&sql, &[]).await?;
        Ok(batch.num_rows() as u64)
    }
}

fn staging_dir(base: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(STAGING_DIR_PREFIX);
    match base {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
}

/// Reconcile, cast and bulk load `data` into `table`. Returns rows loaded.
pub(crate) async fn bulk_write(
    driver: &mut dyn DatabaseDriver,
    table: &TargetTable,
    data: ArrowData,
    opts: &BulkOptions,
) -> Result<u64> {
    opts.validate()?;
    let target = table.schema(driver).await?;
    let ctx = BulkContext {
        table: table.qualified_name(),
        dir: staging_dir(opts.temp_dir.as_deref())?,
        dialect: CsvDialect {
            delimiter: opts.delimiter_byte()?,
            quote: opts.quote_byte()?,
        },
        load: opts.load_options(),
    };

    let batches = if opts.cast {
        data.cast_to(&target, opts.cast_settings())?
    } else {
        data.uncast()
    };
    let mut rows = 0;
    for batch in batches {
        let batch = batch?;
        if batch.num_rows() == 0 {
            continue;
        }
        rows += ctx.load(driver, &batch).await?;
    }
    if opts.commit {
        driver.commit().await?;
    }
    tracing::info!(table = ctx.table, rows, "bulk load complete");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::recording::{Call, RecordingDriver};
    use arrow::array::{ArrayRef, Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn table() -> TargetTable {
        TargetTable::new("db", "dbo", "t").with_schema(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("note", DataType::Utf8, true),
        ])))
    }

    fn batch(ids: Vec<i32>) -> RecordBatch {
        RecordBatch::try_from_iter(vec![("ID", Arc::new(Int32Array::from(ids)) as ArrayRef)]).unwrap()
    }

    #[tokio::test]
    async fn each_batch_gets_its_own_file_and_one_commit() {
        let log = RecordingDriver::new();
        let mut driver = log.clone();
        let data = ArrowData::from(vec![batch(vec![1, 2]), batch(vec![]), batch(vec![3])]);
        let rows = bulk_write(&mut driver, &table(), data, &BulkOptions::default())
            .await
            .unwrap();
        assert_eq!(rows, 3);

        let statements = log.statements();
        assert_eq!(statements.len(), 2);
        assert_ne!(statements[0], statements[1]);
        assert!(statements[0].starts_with("BULK INSERT [db].[dbo].[t] FROM '"));
        assert!(statements[0].contains(".csv' WITH (FORMAT = 'CSV'"));
        assert_eq!(log.calls().last(), Some(&Call::Commit));
    }

    #[tokio::test]
    async fn missing_nullable_columns_are_filled() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let log = RecordingDriver::new().inspect(move |sql| {
            let path = sql.split('\'').nth(1).unwrap_or_default();
            *sink.lock().unwrap() = std::fs::read_to_string(path).unwrap_or_default();
        });
        let mut driver = log.clone();
        let opts = BulkOptions {
            temp_dir: Some(dir.path().to_path_buf()),
            commit: false,
            ..BulkOptions::default()
        };
        bulk_write(&mut driver, &table(), batch(vec![7]).into(), &opts)
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), "id,note\n7,\n");
        assert!(!log.calls().contains(&Call::Commit));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn uncast_input_is_loaded_as_given() {
        let log = RecordingDriver::new();
        let mut driver = log.clone();
        let text = RecordBatch::try_from_iter(vec![(
            "free",
            Arc::new(StringArray::from(vec!["x"])) as ArrayRef,
        )])
        .unwrap();
        let opts = BulkOptions {
            cast: false,
            ..BulkOptions::default()
        };
        assert_eq!(bulk_write(&mut driver, &table(), text.into(), &opts).await.unwrap(), 1);
    }
}
