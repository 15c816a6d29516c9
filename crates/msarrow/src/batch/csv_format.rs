//! Delimited-text staging for bulk loads.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch, StringBuilder};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};

use crate::cast::{format_time, format_timestamp};
use crate::error::Result;

/// Characters the CSV writer needs to frame fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CsvDialect {
    pub delimiter: u8,
    pub quote: u8,
}

fn hex_column<'a>(values: impl Iterator<Item = Option<&'a [u8]>>, len: usize) -> ArrayRef {
    let mut builder = StringBuilder::with_capacity(len, len * 16);
    for v in values {
        match v {
            Some(bytes) => builder.append_value(hex::encode(bytes)),
            None => builder.append_null(),
        }
    }
    Arc::new(builder.finish())
}

/// Text form of one column as the server's bulk loader expects it, or
/// `None` when arrow's own CSV rendering is already right.
fn bulk_text(col: &ArrayRef) -> Result<Option<ArrayRef>> {
    let decimal_as_float = CastOptions {
        safe: true,
        ..CastOptions::default()
    };
    let out = match col.data_type() {
        DataType::Binary => hex_column(col.as_binary::<i32>().iter(), col.len()),
        DataType::LargeBinary => hex_column(col.as_binary::<i64>().iter(), col.len()),
        DataType::FixedSizeBinary(_) => hex_column(col.as_fixed_size_binary().iter(), col.len()),
        DataType::Decimal128(..) | DataType::Decimal256(..) => {
            cast_with_options(col, &DataType::Float64, &decimal_as_float)?
        }
        DataType::Timestamp(..) => format_timestamp(col.as_ref())?,
        DataType::Time32(_) | DataType::Time64(_) => format_time(col.as_ref())?,
        DataType::Date64 => cast_with_options(col, &DataType::Date32, &decimal_as_float)?,
        _ => return Ok(None),
    };
    Ok(Some(out))
}

/// Rewrite binary, decimal and temporal columns into their bulk-load text
/// form. Other columns pass through untouched.
pub(crate) fn stringify_for_bulk(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns = Vec::with_capacity(batch.num_columns());
    let mut changed = false;
    for (field, col) in schema.fields().iter().zip(batch.columns()) {
        match bulk_text(col)? {
            Some(text) => {
                changed = true;
                fields.push(Field::new(field.name(), text.data_type().clone(), field.is_nullable()));
                columns.push(text);
            }
            None => {
                fields.push(field.as_ref().clone());
                columns.push(Arc::clone(col));
            }
        }
    }
    if !changed {
        return Ok(batch.clone());
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Write `batch` to `path` with a header row.
pub(crate) fn write_csv(batch: &RecordBatch, path: &Path, dialect: CsvDialect) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .with_delimiter(dialect.delimiter)
        .with_quote(dialect.quote)
        .build(file);
    writer.write(batch)?;
    Ok(())
}
