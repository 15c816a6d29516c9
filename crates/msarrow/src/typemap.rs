//! SQL Server <-> Arrow type registry.
//!
//! Source descriptors come in two shapes: type names from the column catalog
//! and type codes from a driver's result description. Both resolve to a
//! [`TypeFamily`] first; the family plus precision and scale then picks the
//! concrete Arrow type.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, TimeUnit};
use msarrow_types::{CatalogColumn, ColumnDescription, DescriptionTypeCode};

use crate::error::{Error, Result};

/// Field metadata keys written by the registry.
pub const META_PRECISION: &str = "precision";
pub const META_SCALE: &str = "scale";
pub const META_COLLATION: &str = "collation";
pub const META_IDENTITY: &str = "identity";

/// Strings and binaries longer than this are treated as unbounded.
pub const LARGE_LENGTH_THRESHOLD: u32 = 42_000;

const UTC: &str = "UTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Int,
    UnsignedTiny,
    Bool,
    Decimal,
    Float,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Str,
    Bin,
}

/// Catalog type names, in the order they are reported on lookup failure.
const SQL_TYPES: &[(&str, TypeFamily)] = &[
    ("bigint", TypeFamily::Int),
    ("int", TypeFamily::Int),
    ("smallint", TypeFamily::Int),
    ("tinyint", TypeFamily::UnsignedTiny),
    ("bit", TypeFamily::Bool),
    ("decimal", TypeFamily::Decimal),
    ("numeric", TypeFamily::Decimal),
    ("money", TypeFamily::Decimal),
    ("smallmoney", TypeFamily::Decimal),
    ("float", TypeFamily::Float),
    ("real", TypeFamily::Float),
    ("date", TypeFamily::Date),
    ("time", TypeFamily::Time),
    ("datetime", TypeFamily::DateTime),
    ("datetime2", TypeFamily::DateTime),
    ("smalldatetime", TypeFamily::DateTime),
    ("datetimeoffset", TypeFamily::DateTimeOffset),
    ("char", TypeFamily::Str),
    ("nchar", TypeFamily::Str),
    ("varchar", TypeFamily::Str),
    ("nvarchar", TypeFamily::Str),
    ("text", TypeFamily::Str),
    ("ntext", TypeFamily::Str),
    ("xml", TypeFamily::Str),
    ("sysname", TypeFamily::Str),
    ("uniqueidentifier", TypeFamily::Str),
    ("binary", TypeFamily::Bin),
    ("varbinary", TypeFamily::Bin),
    ("image", TypeFamily::Bin),
    ("timestamp", TypeFamily::Bin),
    ("rowversion", TypeFamily::Bin),
];

fn utc_nanos() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, Some(Arc::from(UTC)))
}

fn naive_nanos() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, None)
}

fn naive_millis() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

/// Temporal values some drivers describe as strings. The (precision, scale)
/// pair is the rendered width and fractional digits of the server format.
const TEMPORAL_STRING_FORMATS: &[(u32, u32, fn() -> DataType)] = &[
    (34, 7, utc_nanos),
    (27, 7, naive_nanos),
    (23, 3, naive_millis),
];

/// A source type as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType<'a> {
    /// Catalog type name such as `datetime2`. Matched case-insensitively.
    Sql(&'a str),
    /// Driver result description type code.
    Driver(DescriptionTypeCode),
}

impl SourceType<'_> {
    fn family(self) -> Result<TypeFamily> {
        match self {
            Self::Sql(name) => {
                let lower = name.trim().to_ascii_lowercase();
                SQL_TYPES
                    .iter()
                    .find(|(n, _)| *n == lower)
                    .map(|(_, family)| *family)
                    .ok_or_else(|| Error::UnsupportedType {
                        type_name: name.to_owned(),
                        known: known_sql_types(),
                    })
            }
            Self::Driver(code) => Ok(match code {
                DescriptionTypeCode::Bytes => TypeFamily::Bin,
                DescriptionTypeCode::Str => TypeFamily::Str,
                DescriptionTypeCode::Bool => TypeFamily::Bool,
                DescriptionTypeCode::Int => TypeFamily::Int,
                DescriptionTypeCode::Float => TypeFamily::Float,
                DescriptionTypeCode::Decimal => TypeFamily::Decimal,
                DescriptionTypeCode::Date => TypeFamily::Date,
                DescriptionTypeCode::Time => TypeFamily::Time,
                DescriptionTypeCode::DateTime => TypeFamily::DateTime,
            }),
        }
    }
}

/// Every catalog type name the registry understands.
#[must_use]
pub fn known_sql_types() -> Vec<&'static str> {
    SQL_TYPES.iter().map(|(n, _)| *n).collect()
}

/// Map fractional-second digits to a time unit.
#[must_use]
pub fn time_unit(scale: Option<u32>) -> TimeUnit {
    match scale {
        Some(0) => TimeUnit::Second,
        Some(1..=3) => TimeUnit::Millisecond,
        Some(4..=6) => TimeUnit::Microsecond,
        _ => TimeUnit::Nanosecond,
    }
}

fn integer_type(precision: Option<u32>) -> DataType {
    match precision {
        Some(p) if p <= 3 => DataType::Int8,
        Some(p) if p <= 5 => DataType::Int16,
        Some(p) if p <= 10 => DataType::Int32,
        _ => DataType::Int64,
    }
}

fn float_type(precision: Option<u32>) -> DataType {
    match precision {
        Some(p) if p < 25 => DataType::Float32,
        _ => DataType::Float64,
    }
}

fn decimal_type(precision: Option<u32>, scale: Option<u32>) -> DataType {
    let precision = precision.filter(|p| *p > 0).unwrap_or(38);
    let scale = scale.unwrap_or(0).min(precision);
    // Arrow caps decimal precision at 76 and scale at i8::MAX.
    let scale = i8::try_from(scale).unwrap_or(i8::MAX);
    if precision > 38 {
        DataType::Decimal256(precision.min(76) as u8, scale)
    } else {
        DataType::Decimal128(precision as u8, scale)
    }
}

fn time_type(scale: Option<u32>) -> DataType {
    match time_unit(scale) {
        unit @ (TimeUnit::Second | TimeUnit::Millisecond) => DataType::Time32(unit),
        unit => DataType::Time64(unit),
    }
}

fn is_unbounded(length: Option<u32>) -> bool {
    match length {
        None | Some(0) => true,
        Some(n) => n > LARGE_LENGTH_THRESHOLD,
    }
}

fn string_type(precision: Option<u32>, scale: Option<u32>) -> DataType {
    if let (Some(p), Some(s)) = (precision, scale) {
        if let Some((_, _, ctor)) = TEMPORAL_STRING_FORMATS
            .iter()
            .find(|(fp, fs, _)| *fp == p && *fs == s)
        {
            return ctor();
        }
    }
    if is_unbounded(precision) {
        DataType::LargeUtf8
    } else {
        DataType::Utf8
    }
}

fn binary_type(precision: Option<u32>) -> DataType {
    if is_unbounded(precision) {
        DataType::LargeBinary
    } else {
        DataType::Binary
    }
}

/// Resolve a source type descriptor to its Arrow type.
pub fn to_columnar_type(
    source: SourceType<'_>,
    precision: Option<u32>,
    scale: Option<u32>,
) -> Result<DataType> {
    let dt = match source.family()? {
        TypeFamily::Int => integer_type(precision),
        TypeFamily::UnsignedTiny => DataType::UInt8,
        TypeFamily::Bool => DataType::Boolean,
        TypeFamily::Decimal => decimal_type(precision, scale),
        TypeFamily::Float => float_type(precision),
        TypeFamily::Date => DataType::Date32,
        TypeFamily::Time => time_type(scale),
        TypeFamily::DateTime => DataType::Timestamp(time_unit(scale), None),
        TypeFamily::DateTimeOffset => DataType::Timestamp(time_unit(scale), Some(Arc::from(UTC))),
        TypeFamily::Str => string_type(precision, scale),
        TypeFamily::Bin => binary_type(precision),
    };
    Ok(dt)
}

/// Build an Arrow field from a column catalog row, carrying precision, scale,
/// collation and identity in the field metadata.
pub fn to_column_field(row: &CatalogColumn) -> Result<Field> {
    let dt = to_columnar_type(SourceType::Sql(&row.type_name), Some(row.precision), Some(row.scale))?;
    let mut metadata = HashMap::from([
        (META_PRECISION.to_owned(), row.precision.to_string()),
        (META_SCALE.to_owned(), row.scale.to_string()),
        (META_IDENTITY.to_owned(), row.identity.to_string()),
    ]);
    if let Some(collation) = &row.collation {
        metadata.insert(META_COLLATION.to_owned(), collation.clone());
    }
    Ok(Field::new(&row.name, dt, row.nullable).with_metadata(metadata))
}

/// Build an Arrow field from a driver result description.
pub fn description_to_field(desc: &ColumnDescription) -> Result<Field> {
    let dt = to_columnar_type(SourceType::Driver(desc.type_code), desc.precision, desc.scale)?;
    Ok(Field::new(&desc.name, dt, desc.nullable))
}

/// Whether a field was flagged as an identity column by the catalog.
#[must_use]
pub fn is_identity(field: &Field) -> bool {
    field
        .metadata()
        .get(META_IDENTITY)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sql(name: &str, p: u32, s: u32) -> DataType {
        to_columnar_type(SourceType::Sql(name), Some(p), Some(s)).unwrap()
    }

    #[rstest]
    #[case("bigint", 19, 0, DataType::Int64)]
    #[case("int", 10, 0, DataType::Int32)]
    #[case("smallint", 5, 0, DataType::Int16)]
    #[case("tinyint", 3, 0, DataType::UInt8)]
    #[case("bit", 1, 0, DataType::Boolean)]
    #[case("real", 24, 0, DataType::Float32)]
    #[case("float", 53, 0, DataType::Float64)]
    #[case("decimal", 18, 4, DataType::Decimal128(18, 4))]
    #[case("numeric", 38, 10, DataType::Decimal128(38, 10))]
    #[case("money", 19, 4, DataType::Decimal128(19, 4))]
    #[case("date", 10, 0, DataType::Date32)]
    #[case("time", 16, 7, DataType::Time64(TimeUnit::Nanosecond))]
    #[case("time", 12, 3, DataType::Time32(TimeUnit::Millisecond))]
    #[case("datetime", 23, 3, DataType::Timestamp(TimeUnit::Millisecond, None))]
    #[case("datetime2", 27, 7, DataType::Timestamp(TimeUnit::Nanosecond, None))]
    #[case("datetime2", 26, 6, DataType::Timestamp(TimeUnit::Microsecond, None))]
    #[case("smalldatetime", 16, 0, DataType::Timestamp(TimeUnit::Second, None))]
    #[case("nvarchar", 0, 0, DataType::LargeUtf8)]
    #[case("varbinary", 0, 0, DataType::LargeBinary)]
    #[case("uniqueidentifier", 0, 0, DataType::LargeUtf8)]
    fn catalog_names(#[case] name: &str, #[case] p: u32, #[case] s: u32, #[case] expected: DataType) {
        assert_eq!(sql(name, p, s), expected);
    }

    #[test]
    fn type_names_are_case_insensitive() {
        assert_eq!(sql("NVarChar", 50, 0), DataType::Utf8);
    }

    #[test]
    fn datetimeoffset_is_utc() {
        assert_eq!(
            sql("datetimeoffset", 34, 7),
            DataType::Timestamp(TimeUnit::Nanosecond, Some(Arc::from("UTC")))
        );
    }

    #[test]
    fn integer_bands_follow_displayed_digits() {
        let int = |p| to_columnar_type(SourceType::Driver(DescriptionTypeCode::Int), Some(p), None).unwrap();
        assert_eq!(int(3), DataType::Int8);
        assert_eq!(int(4), DataType::Int16);
        assert_eq!(int(5), DataType::Int16);
        assert_eq!(int(10), DataType::Int32);
        assert_eq!(int(11), DataType::Int64);
    }

    #[test]
    fn wide_decimals_use_256_bits() {
        assert_eq!(sql("decimal", 39, 2), DataType::Decimal256(39, 2));
        assert_eq!(sql("decimal", 38, 2), DataType::Decimal128(38, 2));
    }

    #[test]
    fn length_threshold_separates_large_variants() {
        assert_eq!(sql("varchar", 42_000, 0), DataType::Utf8);
        assert_eq!(sql("varchar", 42_001, 0), DataType::LargeUtf8);
        assert_eq!(sql("binary", 16, 0), DataType::Binary);
        assert_eq!(sql("image", 42_001, 0), DataType::LargeBinary);
        let unset = to_columnar_type(SourceType::Driver(DescriptionTypeCode::Bytes), None, None).unwrap();
        assert_eq!(unset, DataType::LargeBinary);
    }

    #[test]
    fn driver_strings_with_temporal_widths() {
        let s = |p, sc| {
            to_columnar_type(SourceType::Driver(DescriptionTypeCode::Str), Some(p), Some(sc)).unwrap()
        };
        assert_eq!(s(34, 7), DataType::Timestamp(TimeUnit::Nanosecond, Some(Arc::from("UTC"))));
        assert_eq!(s(27, 7), DataType::Timestamp(TimeUnit::Nanosecond, None));
        assert_eq!(s(23, 3), DataType::Timestamp(TimeUnit::Millisecond, None));
        assert_eq!(s(23, 0), DataType::Utf8);
    }

    #[test]
    fn unknown_type_names_the_known_ones() {
        let err = to_columnar_type(SourceType::Sql("geography"), None, None).unwrap_err();
        match &err {
            Error::UnsupportedType { type_name, known } => {
                assert_eq!(type_name, "geography");
                assert!(known.contains(&"datetime2"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("nvarchar"));
    }

    #[test]
    fn catalog_row_carries_metadata() {
        let row = CatalogColumn {
            name: "id".into(),
            type_name: "int".into(),
            max_length: 4,
            precision: 10,
            scale: 0,
            nullable: false,
            collation: None,
            identity: true,
        };
        let field = to_column_field(&row).unwrap();
        assert_eq!(field.name(), "id");
        assert_eq!(field.data_type(), &DataType::Int32);
        assert!(!field.is_nullable());
        assert!(is_identity(&field));
        assert_eq!(field.metadata().get(META_PRECISION).map(String::as_str), Some("10"));
        assert!(!field.metadata().contains_key(META_COLLATION));
    }

    #[test]
    fn description_field() {
        let desc = ColumnDescription {
            name: "amount".into(),
            type_code: DescriptionTypeCode::Decimal,
            internal_size: None,
            precision: Some(12),
            scale: Some(2),
            nullable: true,
        };
        let field = description_to_field(&desc).unwrap();
        assert_eq!(field.data_type(), &DataType::Decimal128(12, 2));
        assert!(field.is_nullable());
    }
}
