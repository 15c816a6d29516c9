//! String to numeric casts.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Builder, Int64Builder, UInt64Builder};
use arrow::datatypes::DataType;

use super::arrow_cast;
use crate::error::{Error, Result};

/// Borrowed string values of a `Utf8` or `LargeUtf8` column.
pub(super) fn str_values(array: &dyn Array) -> Result<Box<dyn Iterator<Item = Option<&str>> + '_>> {
    match array.data_type() {
        DataType::Utf8 => Ok(Box::new(array.as_string::<i32>().iter())),
        DataType::LargeUtf8 => Ok(Box::new(array.as_string::<i64>().iter())),
        other => Err(Error::cast("", other, &DataType::Utf8, "not a string column")),
    }
}

// i64::MAX is not representable as f64; this is the first float above it.
const I64_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_UPPER_BOUND: f64 = 18_446_744_073_709_551_616.0;

/// Parse a float literal and round it half-to-even, refusing a fraction in
/// safe mode.
fn parse_rounded(s: &str, safe: bool) -> std::result::Result<f64, String> {
    let f: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if !f.is_finite() {
        return Err(format!("'{s}' is not a finite number"));
    }
    if safe && f.fract() != 0.0 {
        return Err(format!("'{s}' has a fractional part"));
    }
    Ok(f.round_ties_even())
}

fn parse_integer(s: &str, safe: bool) -> std::result::Result<i64, String> {
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    let rounded = parse_rounded(s, safe)?;
    if rounded < -I64_UPPER_BOUND || rounded >= I64_UPPER_BOUND {
        return Err(format!("'{s}' is out of range"));
    }
    Ok(rounded as i64)
}

fn parse_unsigned(s: &str, safe: bool) -> std::result::Result<u64, String> {
    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }
    let rounded = parse_rounded(s, safe)?;
    if rounded < 0.0 || rounded >= U64_UPPER_BOUND {
        return Err(format!("'{s}' is out of range"));
    }
    Ok(rounded as u64)
}

/// Parse through a float so `"10.9"` rounds to 11 rather than truncating.
/// Integral strings skip the float so large values stay exact.
pub(super) fn to_integer(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let fail = |reason: String| Error::cast("", array.data_type(), to, reason);
    if to == &DataType::UInt64 {
        let mut builder = UInt64Builder::with_capacity(array.len());
        for value in str_values(array.as_ref())? {
            match value {
                None => builder.append_null(),
                Some(s) => builder.append_value(parse_unsigned(s.trim(), safe).map_err(fail)?),
            }
        }
        return Ok(Arc::new(builder.finish()));
    }

    let mut builder = Int64Builder::with_capacity(array.len());
    for value in str_values(array.as_ref())? {
        match value {
            None => builder.append_null(),
            Some(s) => builder.append_value(parse_integer(s.trim(), safe).map_err(fail)?),
        }
    }
    let ints: ArrayRef = Arc::new(builder.finish());
    if to == &DataType::Int64 {
        return Ok(ints);
    }
    arrow_cast(ints.as_ref(), to)
}

fn decimal_scale(dt: &DataType) -> i8 {
    match dt {
        DataType::Decimal128(_, s) | DataType::Decimal256(_, s) => *s,
        _ => 0,
    }
}

/// Number of significant fractional digits in a plain decimal literal, or
/// `None` if `s` is not one.
fn fractional_digits(s: &str) -> Option<usize> {
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits_only = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !digits_only(int_part) || !digits_only(frac_part) {
        return None;
    }
    Some(frac_part.trim_end_matches('0').len())
}

/// Safe mode parses the literal exactly and refuses extra fractional digits.
/// Otherwise values go through `f64`, which loses digits past its mantissa.
pub(super) fn to_decimal(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    if safe {
        let scale = usize::try_from(decimal_scale(to).max(0)).unwrap_or(0);
        for s in str_values(array.as_ref())?.flatten() {
            let s = s.trim();
            match fractional_digits(s) {
                Some(n) if n <= scale => {}
                Some(_) => {
                    return Err(Error::cast(
                        "",
                        array.data_type(),
                        to,
                        format!("'{s}' has more than {scale} fractional digits"),
                    ))
                }
                None => {
                    return Err(Error::cast(
                        "",
                        array.data_type(),
                        to,
                        format!("'{s}' is not a decimal literal"),
                    ))
                }
            }
        }
        let trimmed = trim_strings(array)?;
        return arrow_cast(trimmed.as_ref(), to);
    }

    let mut builder = Float64Builder::with_capacity(array.len());
    for value in str_values(array.as_ref())? {
        match value {
            None => builder.append_null(),
            Some(s) => {
                let f: f64 = s.trim().parse().map_err(|_| {
                    Error::cast("", array.data_type(), to, format!("'{s}' is not a number"))
                })?;
                builder.append_value(f);
            }
        }
    }
    let floats: ArrayRef = Arc::new(builder.finish());
    arrow_cast(floats.as_ref(), to)
}

fn trim_strings(array: &ArrayRef) -> Result<ArrayRef> {
    let trimmed: arrow::array::StringArray = str_values(array.as_ref())?
        .map(|v| v.map(str::trim))
        .collect();
    Ok(Arc::new(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Decimal128Array, LargeStringArray, StringArray};

    #[test]
    fn parse_integer_cases() {
        assert_eq!(parse_integer("42", true), Ok(42));
        assert_eq!(parse_integer("1e3", true), Ok(1000));
        assert_eq!(parse_integer("10.0", true), Ok(10));
        assert!(parse_integer("10.9", true).is_err());
        assert_eq!(parse_integer("10.9", false), Ok(11));
        assert_eq!(parse_integer("9223372036854775807", true), Ok(i64::MAX));
        assert!(parse_integer("1e30", false).is_err());
        assert!(parse_integer("NaN", false).is_err());
    }

    #[test]
    fn unsigned_targets_accept_values_above_i64() {
        let array: ArrayRef = Arc::new(StringArray::from(vec![
            Some("18446744073709551615"),
            Some("9223372036854775808"),
            Some("2.5"),
            None,
        ]));
        let out = to_integer(&array, &DataType::UInt64, false).unwrap();
        let values = out.as_primitive::<arrow::datatypes::UInt64Type>();
        assert_eq!(values.value(0), u64::MAX);
        assert_eq!(values.value(1), 9_223_372_036_854_775_808);
        assert_eq!(values.value(2), 2);
        assert!(values.is_null(3));

        assert!(to_integer(&array, &DataType::UInt64, true).is_err());
        let negative: ArrayRef = Arc::new(StringArray::from(vec!["-1"]));
        assert!(to_integer(&negative, &DataType::UInt64, false).is_err());
        assert!(parse_unsigned("1e20", false).is_err());
    }

    #[test]
    fn fractional_digit_counting() {
        assert_eq!(fractional_digits("10.50"), Some(1));
        assert_eq!(fractional_digits("-3"), Some(0));
        assert_eq!(fractional_digits(".125"), Some(3));
        assert_eq!(fractional_digits("1e5"), None);
        assert_eq!(fractional_digits("."), None);
    }

    #[test]
    fn safe_decimal_parse_is_exact() {
        let array: ArrayRef = Arc::new(StringArray::from(vec![
            Some("12345678901234567.89"),
            None,
            Some(" -0.5 "),
        ]));
        let out = to_decimal(&array, &DataType::Decimal128(20, 2), true).unwrap();
        let dec = out.as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(dec.value(0), 1_234_567_890_123_456_789);
        assert!(dec.is_null(1));
        assert_eq!(dec.value(2), -50);
    }

    #[test]
    fn safe_decimal_rejects_extra_digits() {
        let array: ArrayRef = Arc::new(StringArray::from(vec!["1.234"]));
        assert!(to_decimal(&array, &DataType::Decimal128(10, 2), true).is_err());
        let out = to_decimal(&array, &DataType::Decimal128(10, 2), false).unwrap();
        let dec = out.as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(dec.value(0), 123);
    }

    #[test]
    fn large_strings_are_supported() {
        let array: ArrayRef = Arc::new(LargeStringArray::from(vec!["7"]));
        let out = to_integer(&array, &DataType::Int16, true).unwrap();
        assert_eq!(out.data_type(), &DataType::Int16);
    }
}
