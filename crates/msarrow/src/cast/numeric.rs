//! Float and decimal casts.

use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, Float64Builder};
use arrow::datatypes::{DataType, Float64Type};

use super::{arrow_cast, ensure_lossless};
use crate::error::{Error, Result};

pub(super) fn float_to_integer(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let floats = arrow_cast(array.as_ref(), &DataType::Float64)?;
    let mut builder = Float64Builder::with_capacity(floats.len());
    for value in floats.as_primitive::<Float64Type>().iter() {
        let Some(f) = value else {
            builder.append_null();
            continue;
        };
        if !f.is_finite() {
            return Err(Error::cast("", array.data_type(), to, format!("{f} is not finite")));
        }
        if safe && f.fract() != 0.0 {
            return Err(Error::cast("", array.data_type(), to, format!("{f} has a fractional part")));
        }
        builder.append_value(f.round_ties_even());
    }
    let rounded: ArrayRef = Arc::new(builder.finish());
    arrow_cast(rounded.as_ref(), to)
}

fn precision_scale(dt: &DataType) -> Option<(i16, i16)> {
    match dt {
        DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => Some((i16::from(*p), i16::from(*s))),
        _ => None,
    }
}

/// Any decimal to any decimal. Widening needs no check; anything that
/// gives up integer digits or scale is verified in safe mode.
pub(super) fn decimal_to_decimal(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let widening = match (precision_scale(array.data_type()), precision_scale(to)) {
        (Some((p1, s1)), Some((p2, s2))) => s2 >= s1 && p2 - s2 >= p1 - s1,
        _ => false,
    };
    let out = arrow_cast(array.as_ref(), to)?;
    if safe && !widening {
        ensure_lossless(array.as_ref(), out.as_ref())?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Decimal128Array, Decimal256Array, Float32Array};
    use arrow::datatypes::{i256, Int16Type};

    fn decimals(values: Vec<Option<i128>>, p: u8, s: i8) -> ArrayRef {
        Arc::new(Decimal128Array::from(values).with_precision_and_scale(p, s).unwrap())
    }

    #[test]
    fn widening_to_256_keeps_values() {
        let array = decimals(vec![Some(12_345), None], 10, 2);
        let out = decimal_to_decimal(&array, &DataType::Decimal256(50, 4), true).unwrap();
        let wide = out.as_any().downcast_ref::<Decimal256Array>().unwrap();
        assert_eq!(wide.value(0), i256::from_i128(1_234_500));
        assert!(wide.is_null(1));
    }

    #[test]
    fn scale_loss_is_gated_by_safe() {
        let array = decimals(vec![Some(12_345)], 10, 2);
        assert!(decimal_to_decimal(&array, &DataType::Decimal128(10, 1), true).is_err());
        let out = decimal_to_decimal(&array, &DataType::Decimal128(10, 1), false).unwrap();
        assert_eq!(out.data_type(), &DataType::Decimal128(10, 1));
    }

    #[test]
    fn exact_narrowing_passes_in_safe_mode() {
        let array = decimals(vec![Some(12_300)], 10, 2);
        let out = decimal_to_decimal(&array, &DataType::Decimal128(8, 1), true).unwrap();
        let narrow = out.as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(narrow.value(0), 1_230);
    }

    #[test]
    fn float32_rounds_half_to_even() {
        let array: ArrayRef = Arc::new(Float32Array::from(vec![0.5, 1.5, -7.0]));
        let out = float_to_integer(&array, &DataType::Int16, false).unwrap();
        assert_eq!(out.as_primitive::<Int16Type>().values(), &[0, 2, -7]);
    }

    #[test]
    fn float_nan_is_rejected() {
        let array: ArrayRef = Arc::new(Float32Array::from(vec![f32::NAN]));
        assert!(float_to_integer(&array, &DataType::Int32, false).is_err());
    }
}
