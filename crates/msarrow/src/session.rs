//! A server session and the write operations run on it.

use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use msarrow_types::SqlValue;

use crate::batch::insert::{write_row_groups, InsertPlan, RetryPolicy};
use crate::batch::typed_col::{downcast_columns, flatten_rows, prepare_parameter_columns};
use crate::batch::{ArrowData, CastBatches};
use crate::bulk::bulk_write;
use crate::config::{BulkOptions, InsertOptions, ParquetOptions};
use crate::driver::{Connector, DatabaseDriver};
use crate::error::{Error, Result};
use crate::fetch::ArrowBatches;
use crate::ingest::{open_parquet, parquet_files};
use crate::statement::{bulk_insert_statement, count_statement, identity_insert_statement, truncate_statement};
use crate::table::TargetTable;

/// One open session. Statements run in submission order and a session is
/// never shared between concurrent work items.
pub struct Session {
    driver: Box<dyn DatabaseDriver>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(driver: Box<dyn DatabaseDriver>) -> Self {
        Self { driver }
    }

    pub async fn connect(connector: &dyn Connector) -> Result<Self> {
        Ok(Self::new(connector.connect().await?))
    }

    /// The underlying driver, for statements this type has no wrapper for.
    pub fn driver(&mut self) -> &mut dyn DatabaseDriver {
        self.driver.as_mut()
    }

    pub async fn execute(&mut self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64> {
        Ok(self.driver.execute(sql, params).await?)
    }

    /// Insert row tuples into `columns` of `table`.
    pub async fn insert_rows(
        &mut self,
        table: &TargetTable,
        columns: &[String],
        rows: &[Vec<SqlValue<'_>>],
        opts: &InsertOptions,
    ) -> Result<u64> {
        opts.validate()?;
        if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(Error::RowWidth {
                row,
                expected: columns.len(),
                actual: values.len(),
            });
        }
        let wrap = opts.identity_insert && self.touches_identity(table, columns).await?;
        if wrap {
            self.set_identity_insert(table, true).await?;
        }
        let plan = insert_plan(table, columns, opts);
        let written = write_row_groups(self.driver.as_mut(), plan, rows.len(), |range| {
            rows[range].iter().flat_map(|row| row.iter().cloned()).collect()
        })
        .await;
        let written = self.finish_identity_insert(table, wrap, written).await?;
        self.finish_write(table, written, opts.commit).await
    }

    /// Reconcile and cast columnar `data` against `table`, then insert it
    /// through multi-row INSERT statements.
    pub async fn insert_arrow(
        &mut self,
        table: &TargetTable,
        data: impl Into<ArrowData>,
        opts: &InsertOptions,
    ) -> Result<u64> {
        opts.validate()?;
        let data = data.into();
        let batches = if opts.cast {
            let target = table.schema(self.driver.as_mut()).await?;
            data.cast_to(&target, opts.cast_settings())?
        } else {
            data.uncast()
        };
        let mut wrap = false;
        let written = self.write_batches(table, batches, opts, &mut wrap).await;
        let written = self.finish_identity_insert(table, wrap, written).await?;
        self.finish_write(table, written, opts.commit).await
    }

    /// Insert the rows of one Parquet file, reading only the columns the
    /// table has.
    pub async fn insert_parquet_file(
        &mut self,
        table: &TargetTable,
        path: &Path,
        opts: &InsertOptions,
        parquet: &ParquetOptions,
    ) -> Result<u64> {
        let target = table.schema(self.driver.as_mut()).await?;
        let reader = open_parquet(path, &target, parquet)?;
        self.insert_arrow(table, ArrowData::Reader(Box::new(reader)), opts).await
    }

    /// Insert every non-empty file under `dir`, one after another on this
    /// session. Returns each file with the rows it contributed. To load
    /// files in parallel, fan out over [`crate::ingest::parquet_files`]
    /// instead.
    pub async fn insert_parquet_dir(
        &mut self,
        table: &TargetTable,
        dir: &Path,
        opts: &InsertOptions,
        parquet: &ParquetOptions,
    ) -> Result<Vec<(PathBuf, u64)>> {
        let files = parquet_files(dir, parquet)?;
        let mut loaded = Vec::with_capacity(files.len());
        for path in files {
            let rows = self.insert_parquet_file(table, &path, opts, parquet).await?;
            loaded.push((path, rows));
        }
        tracing::info!(
            table = %table.qualified_name(),
            dir = %dir.display(),
            files = loaded.len(),
            "parquet directory loaded"
        );
        Ok(loaded)
    }

    async fn write_batches(
        &mut self,
        table: &TargetTable,
        batches: CastBatches,
        opts: &InsertOptions,
        wrap: &mut bool,
    ) -> Result<u64> {
        let mut total = 0;
        let mut first = true;
        for batch in batches {
            let batch = prepare_parameter_columns(&batch?)?;
            if batch.num_columns() == 0 || batch.num_rows() == 0 {
                continue;
            }
            let columns = column_names(&batch);
            if first {
                first = false;
                if opts.identity_insert && self.touches_identity(table, &columns).await? {
                    self.set_identity_insert(table, true).await?;
                    *wrap = true;
                }
            }
            let typed = downcast_columns(&batch)?;
            let plan = insert_plan(table, &columns, opts);
            total += write_row_groups(self.driver.as_mut(), plan, batch.num_rows(), |range| {
                flatten_rows(&typed, range)
            })
            .await?;
        }
        Ok(total)
    }

    /// Issue BULK INSERT for a file that already exists where the server
    /// can read it.
    pub async fn bulk_insert_file(&mut self, table: &TargetTable, path: &Path, opts: &BulkOptions) -> Result<u64> {
        opts.validate()?;
        let sql = bulk_insert_statement(table.qualified_name(), &path.to_string_lossy(), &opts.load_options());
        let rows = self.driver.execute(&sql, &[]).await?;
        self.finish_write(table, rows, opts.commit).await
    }

    /// Stage columnar `data` as CSV and bulk load it into `table`.
    pub async fn bulk_insert_arrow(
        &mut self,
        table: &TargetTable,
        data: impl Into<ArrowData>,
        opts: &BulkOptions,
    ) -> Result<u64> {
        bulk_write(self.driver.as_mut(), table, data.into(), opts).await
    }

    pub async fn set_identity_insert(&mut self, table: &TargetTable, on: bool) -> Result<()> {
        self.driver
            .execute(&identity_insert_statement(table.qualified_name(), on), &[])
            .await?;
        Ok(())
    }

    /// Batches over the result of the last query, `batch_rows` rows at a time.
    pub fn fetch_arrow_batches(&mut self, batch_rows: usize, safe: bool) -> Result<ArrowBatches<'_>> {
        ArrowBatches::new(self.driver.as_mut(), batch_rows, safe)
    }

    /// Run `sql` and collect its whole result as record batches.
    pub async fn query_arrow(&mut self, sql: &str, params: &[SqlValue<'_>], batch_rows: usize) -> Result<Vec<RecordBatch>> {
        self.driver.execute(sql, params).await?;
        self.fetch_arrow_batches(batch_rows, true)?.collect().await
    }

    pub async fn truncate(&mut self, table: &TargetTable) -> Result<()> {
        self.driver.execute(&truncate_statement(table.qualified_name()), &[]).await?;
        Ok(())
    }

    pub async fn count(&mut self, table: &TargetTable) -> Result<u64> {
        self.driver.execute(&count_statement(table.qualified_name()), &[]).await?;
        let rows = self.driver.fetch_rows(1).await?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| Error::Catalog(format!("no row count returned for {}", table.qualified_name())))
    }

    pub async fn commit(&mut self) -> Result<()> {
        Ok(self.driver.commit().await?)
    }

    pub async fn rollback(&mut self) -> Result<()> {
        Ok(self.driver.rollback().await?)
    }

    pub async fn close(mut self) -> Result<()> {
        Ok(self.driver.close().await?)
    }

    async fn touches_identity(&mut self, table: &TargetTable, columns: &[String]) -> Result<bool> {
        let identity = table.identity_columns(self.driver.as_mut()).await?;
        Ok(columns
            .iter()
            .any(|c| identity.iter().any(|i| i.eq_ignore_ascii_case(c))))
    }

    /// Turn IDENTITY_INSERT back off when it was turned on. A failure to do
    /// so only surfaces when the write itself succeeded.
    async fn finish_identity_insert(&mut self, table: &TargetTable, wrapped: bool, written: Result<u64>) -> Result<u64> {
        if !wrapped {
            return written;
        }
        let off = self.set_identity_insert(table, false).await;
        match (written, off) {
            (Ok(n), Ok(())) => Ok(n),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), off) => {
                if let Err(off_err) = off {
                    tracing::warn!(
                        table = table.qualified_name(),
                        error = %off_err,
                        "failed to reset IDENTITY_INSERT after a failed write"
                    );
                }
                Err(e)
            }
        }
    }

    async fn finish_write(&mut self, table: &TargetTable, rows: u64, commit: bool) -> Result<u64> {
        if commit {
            self.driver.commit().await?;
        }
        tracing::info!(table = table.qualified_name(), rows, commit, "write complete");
        Ok(rows)
    }
}

fn insert_plan<'a>(table: &'a TargetTable, columns: &'a [String], opts: &InsertOptions) -> InsertPlan<'a> {
    InsertPlan {
        table: table.qualified_name(),
        columns,
        commit_size: opts.commit_size,
        tablock: opts.tablock,
        retry: RetryPolicy {
            retries: opts.retry,
            delay: opts.retry_delay(),
        },
    }
}

fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch.schema().fields().iter().map(|f| f.name().clone()).collect()
}
