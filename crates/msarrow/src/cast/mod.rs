//! Column cast engine.
//!
//! Dispatch is a match over the closed Arrow type set, refined in four
//! steps: exact `(from, to)` pairs, then `(category, to)`, then
//! `(from, category)`, then `(category, category)`. Anything unmatched goes
//! through arrow's own cast kernel, with a round-trip check when `safe` is
//! set.

mod numeric;
mod string;
mod temporal;

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::compute::{can_cast_types, cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::util::display::FormatOptions;

use crate::error::{Error, Result};
use crate::reconcile::ReconcilePlan;

pub(crate) use temporal::{format_time, format_timestamp};

/// Coarse grouping of Arrow types used by family-level cast rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Null,
    Boolean,
    SignedInt,
    UnsignedInt,
    Float,
    Decimal,
    Date,
    Time,
    Timestamp,
    String,
    Binary,
    Other,
}

impl TypeCategory {
    #[must_use]
    pub fn of(dt: &DataType) -> Self {
        match dt {
            DataType::Null => Self::Null,
            DataType::Boolean => Self::Boolean,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => Self::SignedInt,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
                Self::UnsignedInt
            }
            DataType::Float16 | DataType::Float32 | DataType::Float64 => Self::Float,
            DataType::Decimal128(..) | DataType::Decimal256(..) => Self::Decimal,
            DataType::Date32 | DataType::Date64 => Self::Date,
            DataType::Time32(_) | DataType::Time64(_) => Self::Time,
            DataType::Timestamp(..) => Self::Timestamp,
            DataType::Utf8 | DataType::LargeUtf8 => Self::String,
            DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => Self::Binary,
            _ => Self::Other,
        }
    }

    fn is_integer(self) -> bool {
        matches!(self, Self::SignedInt | Self::UnsignedInt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CastRule {
    StringToInteger,
    StringToDecimal,
    StringToDate,
    StringToTime,
    StringToTimestamp,
    FloatToInteger,
    DecimalToDecimal,
    TimestampToTimestamp,
}

fn exact_rule(from: &DataType, to: &DataType) -> Option<CastRule> {
    match (from, to) {
        (DataType::Utf8 | DataType::LargeUtf8, DataType::Date32 | DataType::Date64) => {
            Some(CastRule::StringToDate)
        }
        _ => None,
    }
}

fn source_category_rule(from: TypeCategory, to: &DataType) -> Option<CastRule> {
    let to_category = TypeCategory::of(to);
    match from {
        TypeCategory::String if to_category.is_integer() => Some(CastRule::StringToInteger),
        TypeCategory::String if to_category == TypeCategory::Time => Some(CastRule::StringToTime),
        TypeCategory::Float if to_category.is_integer() => Some(CastRule::FloatToInteger),
        _ => None,
    }
}

fn target_category_rule(from: &DataType, to: TypeCategory) -> Option<CastRule> {
    match (from, to) {
        (DataType::Utf8 | DataType::LargeUtf8, TypeCategory::Decimal) => {
            Some(CastRule::StringToDecimal)
        }
        (DataType::Utf8 | DataType::LargeUtf8, TypeCategory::Timestamp) => {
            Some(CastRule::StringToTimestamp)
        }
        _ => None,
    }
}

fn category_rule(from: TypeCategory, to: TypeCategory) -> Option<CastRule> {
    match (from, to) {
        (TypeCategory::Decimal, TypeCategory::Decimal) => Some(CastRule::DecimalToDecimal),
        (TypeCategory::Timestamp, TypeCategory::Timestamp) => Some(CastRule::TimestampToTimestamp),
        _ => None,
    }
}

fn resolve_rule(from: &DataType, to: &DataType) -> Option<CastRule> {
    let (from_category, to_category) = (TypeCategory::of(from), TypeCategory::of(to));
    exact_rule(from, to)
        .or_else(|| source_category_rule(from_category, to))
        .or_else(|| target_category_rule(from, to_category))
        .or_else(|| category_rule(from_category, to_category))
}

/// Arrow cast options that fail instead of nulling out unconvertible values.
pub(crate) fn strict_options() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        format_options: FormatOptions::default(),
    }
}

pub(crate) fn arrow_cast(array: &dyn Array, to: &DataType) -> Result<ArrayRef> {
    cast_with_options(array, to, &strict_options())
        .map_err(|e| Error::cast("", array.data_type(), to, e.to_string()))
}

/// Reject `casted` if casting it back does not reproduce `original`.
pub(crate) fn ensure_lossless(original: &dyn Array, casted: &dyn Array) -> Result<()> {
    let (from, to) = (original.data_type(), casted.data_type());
    if !can_cast_types(to, from) {
        return Ok(());
    }
    let lossy = match cast_with_options(casted, from, &strict_options()) {
        Ok(back) => back.to_data() != original.to_data(),
        Err(_) => true,
    };
    if lossy {
        return Err(Error::cast(
            "",
            from,
            to,
            "values are not exactly representable in the target type",
        ));
    }
    Ok(())
}

fn generic_cast(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let out = arrow_cast(array.as_ref(), to)?;
    if safe {
        ensure_lossless(array.as_ref(), out.as_ref())?;
    }
    Ok(out)
}

/// Convert one column to `to`.
///
/// With `safe` set, any value that cannot be represented exactly or
/// unambiguously is an error. Without it, conversions round, truncate or
/// pick the earlier of two local times. Unparseable input fails either way.
pub fn cast_column(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    if array.data_type() == to {
        return Ok(Arc::clone(array));
    }
    match resolve_rule(array.data_type(), to) {
        Some(CastRule::StringToInteger) => string::to_integer(array, to, safe),
        Some(CastRule::StringToDecimal) => string::to_decimal(array, to, safe),
        Some(CastRule::StringToDate) => temporal::string_to_date(array, to, safe),
        Some(CastRule::StringToTime) => temporal::string_to_time(array, to, safe),
        Some(CastRule::StringToTimestamp) => temporal::string_to_timestamp(array, to, safe),
        Some(CastRule::FloatToInteger) => numeric::float_to_integer(array, to, safe),
        Some(CastRule::DecimalToDecimal) => numeric::decimal_to_decimal(array, to, safe),
        Some(CastRule::TimestampToTimestamp) => temporal::timestamp_to_timestamp(array, to, safe),
        None => generic_cast(array, to, safe),
    }
}

/// Reconcile and cast options shared by the insert and bulk paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastSettings {
    pub safe: bool,
    pub fill_empty: bool,
    pub drop_unmatched: bool,
}

impl Default for CastSettings {
    fn default() -> Self {
        Self {
            safe: true,
            fill_empty: false,
            drop_unmatched: true,
        }
    }
}

/// Reconcile-and-cast plan for batches sharing one source schema.
///
/// Built once per stream and applied to every batch it yields.
#[derive(Debug, Clone)]
pub struct BatchCaster {
    plan: ReconcilePlan,
    schema: SchemaRef,
    safe: bool,
}

impl BatchCaster {
    pub fn new(source: &Schema, target: &SchemaRef, settings: CastSettings) -> Result<Self> {
        let plan = ReconcilePlan::new(source, target, settings.fill_empty, settings.drop_unmatched)?;
        let fields: Vec<Field> = plan
            .schema()
            .fields()
            .iter()
            .map(|aligned| {
                target
                    .field_with_name(aligned.name())
                    .map(Field::clone)
                    .unwrap_or_else(|_| aligned.as_ref().clone())
            })
            .collect();
        let schema = Arc::new(Schema::new_with_metadata(fields, target.metadata().clone()));
        Ok(Self {
            plan,
            schema,
            safe: settings.safe,
        })
    }

    /// Schema of every batch this caster produces.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn cast(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let aligned = self.plan.apply(batch)?;
        let columns = aligned
            .columns()
            .iter()
            .zip(self.schema.fields())
            .map(|(col, field)| {
                let out = cast_column(col, field.data_type(), self.safe).map_err(|e| e.in_column(field.name()))?;
                if !field.is_nullable() && out.null_count() > 0 {
                    return Err(Error::cast(
                        field.name().as_str(),
                        col.data_type(),
                        field.data_type(),
                        format!("{} null value(s) in a non-nullable column", out.null_count()),
                    ));
                }
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
        Ok(RecordBatch::try_new_with_options(
            Arc::clone(&self.schema),
            columns,
            &options,
        )?)
    }
}

/// Reconcile `batch` against `schema` and cast every column to its target type.
pub fn cast_batch(batch: &RecordBatch, schema: &SchemaRef, settings: CastSettings) -> Result<RecordBatch> {
    BatchCaster::new(batch.schema_ref(), schema, settings)?.cast(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        AsArray, Decimal128Array, Float64Array, Int32Array, Int64Array, StringArray,
    };
    use arrow::datatypes::{Int32Type, Int64Type, TimeUnit};

    fn strings(values: &[Option<&str>]) -> ArrayRef {
        Arc::new(StringArray::from(values.to_vec()))
    }

    #[test]
    fn same_type_is_identity() {
        let array: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let out = cast_column(&array, &DataType::Int32, true).unwrap();
        assert!(Arc::ptr_eq(&array, &out));
    }

    #[test]
    fn rule_resolution_order() {
        assert_eq!(
            resolve_rule(&DataType::Utf8, &DataType::Date32),
            Some(CastRule::StringToDate)
        );
        assert_eq!(
            resolve_rule(&DataType::LargeUtf8, &DataType::UInt16),
            Some(CastRule::StringToInteger)
        );
        assert_eq!(
            resolve_rule(&DataType::Utf8, &DataType::Decimal256(40, 2)),
            Some(CastRule::StringToDecimal)
        );
        assert_eq!(
            resolve_rule(&DataType::Decimal128(10, 2), &DataType::Decimal256(50, 4)),
            Some(CastRule::DecimalToDecimal)
        );
        assert_eq!(
            resolve_rule(
                &DataType::Timestamp(TimeUnit::Second, None),
                &DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
            ),
            Some(CastRule::TimestampToTimestamp)
        );
        assert_eq!(resolve_rule(&DataType::Int32, &DataType::Int64), None);
    }

    #[test]
    fn fractional_string_to_integer_is_gated_by_safe() {
        let array = strings(&[Some("10.9")]);
        let err = cast_column(&array, &DataType::Int32, true).unwrap_err();
        assert!(matches!(err, Error::Cast { .. }), "got: {err}");

        let out = cast_column(&array, &DataType::Int32, false).unwrap();
        assert_eq!(out.as_primitive::<Int32Type>().value(0), 11);
    }

    #[test]
    fn string_to_integer_rounds_half_to_even() {
        let array = strings(&[Some("2.5"), Some("3.5"), Some("-2.5"), None, Some(" 42 ")]);
        let out = cast_column(&array, &DataType::Int64, false).unwrap();
        let ints = out.as_primitive::<Int64Type>();
        assert_eq!(ints.value(0), 2);
        assert_eq!(ints.value(1), 4);
        assert_eq!(ints.value(2), -2);
        assert!(ints.is_null(3));
        assert_eq!(ints.value(4), 42);
    }

    #[test]
    fn unparseable_strings_fail_in_both_modes() {
        let array = strings(&[Some("ten")]);
        assert!(cast_column(&array, &DataType::Int32, true).is_err());
        assert!(cast_column(&array, &DataType::Int32, false).is_err());
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let array = strings(&[Some("300")]);
        assert!(cast_column(&array, &DataType::Int8, false).is_err());
    }

    #[test]
    fn generic_narrowing_checks_losslessness() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![9_007_199_254_740_993]));
        assert!(cast_column(&array, &DataType::Float64, true).is_err());
        let out = cast_column(&array, &DataType::Float64, false).unwrap();
        assert_eq!(out.data_type(), &DataType::Float64);

        let array: ArrayRef = Arc::new(Int64Array::from(vec![1, 2]));
        let out = cast_column(&array, &DataType::Float64, true).unwrap();
        assert_eq!(out.as_any().downcast_ref::<Float64Array>().unwrap().value(1), 2.0);
    }

    #[test]
    fn float_to_integer_respects_safe() {
        let array: ArrayRef = Arc::new(Float64Array::from(vec![Some(1.0), Some(2.5), None]));
        assert!(cast_column(&array, &DataType::Int32, true).is_err());
        let out = cast_column(&array, &DataType::Int32, false).unwrap();
        let ints = out.as_primitive::<Int32Type>();
        assert_eq!(ints.value(0), 1);
        assert_eq!(ints.value(1), 2);
        assert!(ints.is_null(2));
    }

    #[test]
    fn cast_batch_casts_and_renames() {
        let source = Arc::new(Schema::new(vec![
            Field::new("ID", DataType::Utf8, true),
            Field::new("extra", DataType::Int32, true),
        ]));
        let batch = RecordBatch::try_new(
            source,
            vec![
                strings(&[Some("1"), Some("2")]),
                Arc::new(Int32Array::from(vec![7, 8])),
            ],
        )
        .unwrap();
        let target = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("price", DataType::Decimal128(10, 2), true),
        ]));
        let settings = CastSettings {
            safe: true,
            fill_empty: true,
            drop_unmatched: false,
        };
        let out = cast_batch(&batch, &target, settings).unwrap();
        assert_eq!(out.schema(), target);
        assert_eq!(out.column(0).as_primitive::<Int64Type>().values(), &[1, 2]);
        let price = out.column(1).as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(price.null_count(), 2);
    }

    #[test]
    fn cast_batch_names_the_failing_column() {
        let source = Arc::new(Schema::new(vec![Field::new("qty", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(source, vec![strings(&[Some("1.5")])]).unwrap();
        let target = Arc::new(Schema::new(vec![Field::new("qty", DataType::Int32, true)]));
        let err = cast_batch(&batch, &target, CastSettings::default()).unwrap_err();
        assert!(err.to_string().contains("'qty'"), "got: {err}");
    }

    #[test]
    fn nulls_in_a_non_nullable_target_name_the_column() {
        let source = Arc::new(Schema::new(vec![Field::new("sku", DataType::Utf8, true)]));
        let batch = RecordBatch::try_new(source, vec![strings(&[Some("a"), None])]).unwrap();
        let target = Arc::new(Schema::new(vec![Field::new("sku", DataType::Utf8, false)]));

        let err = cast_batch(&batch, &target, CastSettings::default()).unwrap_err();
        match err {
            Error::Cast { column, reason, .. } => {
                assert_eq!(column, "sku");
                assert!(reason.contains("non-nullable"), "got: {reason}");
            }
            other => panic!("expected a cast error, got {other:?}"),
        }
    }
}
