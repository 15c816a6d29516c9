//! Fetched rows as Arrow record batches.

use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryBuilder, LargeBinaryBuilder, RecordBatch, RecordBatchOptions, StringBuilder};
use arrow::datatypes::{DataType, Schema, SchemaRef};
use msarrow_types::{ColumnDescription, SqlValue};

use crate::cast::cast_column;
use crate::driver::DatabaseDriver;
use crate::error::{Error, Result};
use crate::typemap::description_to_field;

/// Arrow schema of a result set.
pub fn description_schema(description: &[ColumnDescription]) -> Result<SchemaRef> {
    let fields = description
        .iter()
        .map(description_to_field)
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

fn bytes_of<'v>(value: &'v SqlValue<'_>) -> Option<std::borrow::Cow<'v, [u8]>> {
    match value {
        SqlValue::Bytes(b) => Some(std::borrow::Cow::Borrowed(b.as_ref())),
        other => other.to_text().map(|t| std::borrow::Cow::Owned(t.into_owned().into_bytes())),
    }
}

fn binary_column(rows: &[Vec<SqlValue<'static>>], idx: usize, large: bool) -> ArrayRef {
    let cells = rows.iter().map(|r| r.get(idx).and_then(bytes_of));
    if large {
        let mut builder = LargeBinaryBuilder::with_capacity(rows.len(), 0);
        for cell in cells {
            builder.append_option(cell);
        }
        Arc::new(builder.finish())
    } else {
        let mut builder = BinaryBuilder::with_capacity(rows.len(), 0);
        for cell in cells {
            builder.append_option(cell);
        }
        Arc::new(builder.finish())
    }
}

fn text_column(rows: &[Vec<SqlValue<'static>>], idx: usize) -> ArrayRef {
    let mut builder = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
    for row in rows {
        builder.append_option(row.get(idx).and_then(SqlValue::to_text));
    }
    Arc::new(builder.finish())
}

/// Build a batch from row-major cells. Binary columns are copied as bytes;
/// everything else goes through its text form and the cast engine.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Vec<SqlValue<'static>>], safe: bool) -> Result<RecordBatch> {
    let mut columns = Vec::with_capacity(schema.fields().len());
    for (idx, field) in schema.fields().iter().enumerate() {
        let column = match field.data_type() {
            DataType::Binary => binary_column(rows, idx, false),
            DataType::LargeBinary => binary_column(rows, idx, true),
            dt => cast_column(&text_column(rows, idx), dt, safe).map_err(|e| e.in_column(field.name()))?,
        };
        columns.push(column);
    }
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(Arc::clone(schema), columns, &options)?)
}

/// Lazy batches over the current result set of a session.
pub struct ArrowBatches<'s> {
    driver: &'s mut dyn DatabaseDriver,
    schema: SchemaRef,
    batch_rows: usize,
    safe: bool,
    exhausted: bool,
}

impl<'s> ArrowBatches<'s> {
    pub(crate) fn new(driver: &'s mut dyn DatabaseDriver, batch_rows: usize, safe: bool) -> Result<Self> {
        let description = driver
            .description()
            .ok_or_else(|| Error::Catalog("no result set to fetch from".into()))?;
        let schema = description_schema(&description)?;
        Ok(Self {
            driver,
            schema,
            batch_rows: batch_rows.max(1),
            safe,
            exhausted: false,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Next batch of up to `batch_rows` rows, or `None` once the result set
    /// is drained.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.exhausted {
            return Ok(None);
        }
        let rows = self.driver.fetch_rows(self.batch_rows).await?;
        if rows.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        if rows.len() < self.batch_rows {
            self.exhausted = true;
        }
        rows_to_batch(&self.schema, &rows, self.safe).map(Some)
    }

    /// Drain the rest of the result set.
    pub async fn collect(mut self) -> Result<Vec<RecordBatch>> {
        let mut out = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            out.push(batch);
        }
        Ok(out)
    }
}
