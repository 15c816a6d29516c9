//! Typed Arrow column helpers for the parameterized INSERT path.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Date64Array,
    Decimal128Array, Decimal256Array, FixedSizeBinaryArray, Float16Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, LargeBinaryArray,
    LargeStringArray, RecordBatch, StringArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::{Duration, NaiveDate};
use msarrow_types::SqlValue;

use crate::cast::{format_time, format_timestamp};
use crate::error::{Error, Result};

static UNIX_EPOCH_DATE: LazyLock<NaiveDate> = LazyLock::new(NaiveDate::default);

/// Replace timestamp and time columns with their fixed-width text form.
/// The server parses these losslessly, which native binding of
/// nanosecond values does not guarantee.
pub(crate) fn prepare_parameter_columns(batch: &RecordBatch) -> Result<RecordBatch> {
    if !batch
        .columns()
        .iter()
        .any(|c| matches!(c.data_type(), DataType::Timestamp(..) | DataType::Time32(_) | DataType::Time64(_)))
    {
        return Ok(batch.clone());
    }
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, col) in batch.schema().fields().iter().zip(batch.columns()) {
        let text = match col.data_type() {
            DataType::Timestamp(..) => Some(format_timestamp(col.as_ref())?),
            DataType::Time32(_) | DataType::Time64(_) => Some(format_time(col.as_ref())?),
            _ => None,
        };
        match text {
            Some(text) => {
                fields.push(Field::new(field.name(), DataType::Utf8, field.is_nullable()));
                columns.push(text);
            }
            None => {
                fields.push(field.as_ref().clone());
                columns.push(Arc::clone(col));
            }
        }
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Pre-downcast Arrow column reference. Resolves the concrete array type
/// once per column per batch instead of once per cell.
pub(crate) enum TypedCol<'a> {
    Boolean(&'a BooleanArray),
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    UInt8(&'a UInt8Array),
    UInt16(&'a UInt16Array),
    UInt32(&'a UInt32Array),
    UInt64(&'a UInt64Array),
    Float16(&'a Float16Array),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Decimal128(&'a Decimal128Array),
    Decimal256(&'a Decimal256Array),
    Utf8(&'a StringArray),
    LargeUtf8(&'a LargeStringArray),
    Binary(&'a BinaryArray),
    LargeBinary(&'a LargeBinaryArray),
    FixedSizeBinary(&'a FixedSizeBinaryArray),
    Date32(&'a Date32Array),
    Date64(&'a Date64Array),
    Null,
}

fn downcast<'a, T: 'static>(col: &'a ArrayRef, index: usize, expected: &str) -> Result<&'a T> {
    col.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::cast(
            format!("#{index}"),
            col.data_type(),
            col.data_type(),
            format!("downcast failed (expected {expected})"),
        )
    })
}

/// Pre-downcast every column of `batch`.
pub(crate) fn downcast_columns(batch: &RecordBatch) -> Result<Vec<TypedCol<'_>>> {
    batch
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let typed = match col.data_type() {
                DataType::Null => TypedCol::Null,
                DataType::Boolean => TypedCol::Boolean(col.as_boolean()),
                DataType::Int8 => TypedCol::Int8(downcast(col, i, "Int8Array")?),
                DataType::Int16 => TypedCol::Int16(downcast(col, i, "Int16Array")?),
                DataType::Int32 => TypedCol::Int32(downcast(col, i, "Int32Array")?),
                DataType::Int64 => TypedCol::Int64(downcast(col, i, "Int64Array")?),
                DataType::UInt8 => TypedCol::UInt8(downcast(col, i, "UInt8Array")?),
                DataType::UInt16 => TypedCol::UInt16(downcast(col, i, "UInt16Array")?),
                DataType::UInt32 => TypedCol::UInt32(downcast(col, i, "UInt32Array")?),
                DataType::UInt64 => TypedCol::UInt64(downcast(col, i, "UInt64Array")?),
                DataType::Float16 => TypedCol::Float16(downcast(col, i, "Float16Array")?),
                DataType::Float32 => TypedCol::Float32(downcast(col, i, "Float32Array")?),
                DataType::Float64 => TypedCol::Float64(downcast(col, i, "Float64Array")?),
                DataType::Decimal128(..) => TypedCol::Decimal128(downcast(col, i, "Decimal128Array")?),
                DataType::Decimal256(..) => TypedCol::Decimal256(downcast(col, i, "Decimal256Array")?),
                DataType::Utf8 => TypedCol::Utf8(col.as_string::<i32>()),
                DataType::LargeUtf8 => TypedCol::LargeUtf8(col.as_string::<i64>()),
                DataType::Binary => TypedCol::Binary(col.as_binary::<i32>()),
                DataType::LargeBinary => TypedCol::LargeBinary(col.as_binary::<i64>()),
                DataType::FixedSizeBinary(_) => TypedCol::FixedSizeBinary(col.as_fixed_size_binary()),
                DataType::Date32 => TypedCol::Date32(downcast(col, i, "Date32Array")?),
                DataType::Date64 => TypedCol::Date64(downcast(col, i, "Date64Array")?),
                other => {
                    return Err(Error::cast(
                        batch.schema().field(i).name(),
                        other,
                        other,
                        "type has no parameter binding",
                    ))
                }
            };
            Ok(typed)
        })
        .collect()
}

/// Parameter value of one cell.
pub(crate) fn sql_param_value<'a>(col: &TypedCol<'a>, row_idx: usize) -> SqlValue<'a> {
    macro_rules! cell {
        ($arr:expr, $conv:expr) => {
            if $arr.is_null(row_idx) {
                SqlValue::Null
            } else {
                $conv($arr.value(row_idx))
            }
        };
    }
    match col {
        TypedCol::Null => SqlValue::Null,
        TypedCol::Boolean(arr) => cell!(arr, SqlValue::Bool),
        // The server has no signed tinyint.
        TypedCol::Int8(arr) => cell!(arr, |v: i8| SqlValue::I16(i16::from(v))),
        TypedCol::Int16(arr) => cell!(arr, SqlValue::I16),
        TypedCol::Int32(arr) => cell!(arr, SqlValue::I32),
        TypedCol::Int64(arr) => cell!(arr, SqlValue::I64),
        TypedCol::UInt8(arr) => cell!(arr, SqlValue::U8),
        TypedCol::UInt16(arr) => cell!(arr, |v: u16| SqlValue::I32(i32::from(v))),
        TypedCol::UInt32(arr) => cell!(arr, |v: u32| SqlValue::I64(i64::from(v))),
        TypedCol::UInt64(arr) => cell!(arr, |v: u64| match i64::try_from(v) {
            Ok(v) => SqlValue::I64(v),
            Err(_) => SqlValue::Numeric(Cow::Owned(v.to_string())),
        }),
        TypedCol::Float16(arr) => cell!(arr, |v: half::f16| SqlValue::F32(v.to_f32())),
        TypedCol::Float32(arr) => cell!(arr, SqlValue::F32),
        TypedCol::Float64(arr) => cell!(arr, SqlValue::F64),
        TypedCol::Decimal128(arr) => {
            if arr.is_null(row_idx) {
                SqlValue::Null
            } else {
                SqlValue::Numeric(Cow::Owned(arr.value_as_string(row_idx)))
            }
        }
        TypedCol::Decimal256(arr) => {
            if arr.is_null(row_idx) {
                SqlValue::Null
            } else {
                SqlValue::Numeric(Cow::Owned(arr.value_as_string(row_idx)))
            }
        }
        TypedCol::Utf8(arr) => cell!(arr, |v: &'a str| SqlValue::Text(Cow::Borrowed(v))),
        TypedCol::LargeUtf8(arr) => cell!(arr, |v: &'a str| SqlValue::Text(Cow::Borrowed(v))),
        TypedCol::Binary(arr) => cell!(arr, |v: &'a [u8]| SqlValue::Bytes(Cow::Borrowed(v))),
        TypedCol::LargeBinary(arr) => cell!(arr, |v: &'a [u8]| SqlValue::Bytes(Cow::Borrowed(v))),
        TypedCol::FixedSizeBinary(arr) => {
            cell!(arr, |v: &'a [u8]| SqlValue::Bytes(Cow::Borrowed(v)))
        }
        TypedCol::Date32(arr) => cell!(arr, |days: i32| {
            SqlValue::Date(*UNIX_EPOCH_DATE + Duration::days(i64::from(days)))
        }),
        TypedCol::Date64(arr) => cell!(arr, |ms: i64| {
            SqlValue::Date(*UNIX_EPOCH_DATE + Duration::days(ms.div_euclid(86_400_000)))
        }),
    }
}

/// Row-major parameter values of `rows`.
pub(crate) fn flatten_rows<'a>(cols: &[TypedCol<'a>], rows: std::ops::Range<usize>) -> Vec<SqlValue<'a>> {
    let mut params = Vec::with_capacity(rows.len() * cols.len());
    for row in rows {
        for col in cols {
            params.push(sql_param_value(col, row));
        }
    }
    params
}
