use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Decimal128Array, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use msarrow::statement::insert_batch_statement;
use msarrow::{cast_column, reconcile, safe_commit_size, Error, MAX_BOUND_PARAMETERS};
use proptest::prelude::*;

proptest! {
    #[test]
    fn clamped_commit_size_fits_the_parameter_ceiling(columns in 1_usize..=2099, commit_size in 1_usize..=1000) {
        let effective = safe_commit_size(commit_size, columns);
        prop_assert!(effective >= 1);
        prop_assert!(effective <= commit_size);
        prop_assert!(columns * effective <= MAX_BOUND_PARAMETERS);
    }

    #[test]
    fn same_type_cast_returns_the_input(values in proptest::collection::vec(proptest::option::of(any::<i64>()), 0..64), safe in any::<bool>()) {
        let array: ArrayRef = Arc::new(Int64Array::from(values));
        let out = cast_column(&array, &DataType::Int64, safe).unwrap();
        prop_assert!(Arc::ptr_eq(&array, &out));
    }

    #[test]
    fn same_type_string_and_timestamp_casts_are_identity(
        text in proptest::collection::vec(proptest::option::of(".{0,12}"), 0..32),
        micros in proptest::collection::vec(proptest::option::of(-10_i64.pow(15)..10_i64.pow(15)), 0..32),
    ) {
        let strings: ArrayRef = Arc::new(StringArray::from(text));
        prop_assert_eq!(cast_column(&strings, &DataType::Utf8, true).unwrap().to_data(), strings.to_data());

        let ts_type = DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()));
        let stamps: ArrayRef = Arc::new(TimestampMicrosecondArray::from(micros).with_timezone("UTC"));
        prop_assert_eq!(cast_column(&stamps, &ts_type, true).unwrap().to_data(), stamps.to_data());
    }

    #[test]
    fn integral_floats_cast_exactly_in_safe_mode(values in proptest::collection::vec(-1_000_000_i64..1_000_000, 1..32)) {
        let floats: ArrayRef = Arc::new(Float64Array::from_iter_values(values.iter().map(|v| *v as f64)));
        let out = cast_column(&floats, &DataType::Int64, true).unwrap();
        let expected = Int64Array::from(values);
        prop_assert_eq!(out.to_data(), expected.to_data());
    }
}

#[test]
fn a_table_wider_than_the_ceiling_is_refused() {
    assert_eq!(safe_commit_size(10, 2100), 1);
    let columns: Vec<String> = (0..2100).map(|i| format!("c{i}")).collect();
    let err = insert_batch_statement("t", &columns, safe_commit_size(10, 2100), false).unwrap_err();
    assert!(matches!(err, Error::ParameterLimitExceeded { columns: 2100, rows: 1, limit: 2099 }));
}

#[test]
fn decimal_widening_keeps_values() {
    let narrow: ArrayRef = Arc::new(
        Decimal128Array::from(vec![Some(12_345), None, Some(-1)])
            .with_precision_and_scale(7, 2)
            .unwrap(),
    );
    let wide = cast_column(&narrow, &DataType::Decimal128(18, 4), true).unwrap();
    let wide = wide.as_any().downcast_ref::<Decimal128Array>().unwrap();
    assert_eq!(wide.value(0), 1_234_500);
    assert!(wide.is_null(1));
    assert_eq!(wide.value(2), -100);
}

#[test]
fn reconcile_fills_missing_nullable_columns() {
    let target = Arc::new(Schema::new(vec![
        Field::new("a", DataType::Int64, true),
        Field::new("b", DataType::Utf8, true),
        Field::new("c", DataType::Float64, true),
    ]));
    let source = arrow::array::RecordBatch::try_from_iter(vec![(
        "A",
        Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
    )])
    .unwrap();
    let out = reconcile(&source, &target, true, false).unwrap();
    assert_eq!(out.num_columns(), 3);
    assert_eq!(out.column(1).data_type(), &DataType::Utf8);
    assert_eq!(out.column(2).data_type(), &DataType::Float64);
    assert_eq!(out.column(1).null_count(), 3);
    assert_eq!(out.column(2).null_count(), 3);
}
