//! Date, time and timestamp casts, plus the fixed-width text forms used on
//! the wire.

use std::str::FromStr;
use std::sync::Arc;

use arrow::array::timezone::Tz;
use arrow::array::{
    Array, ArrayRef, AsArray, Date32Array, Date64Array, StringBuilder, Time32MillisecondArray,
    Time32SecondArray, Time64MicrosecondArray, Time64NanosecondArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{
    DataType, Int64Type, Time32MillisecondType, Time32SecondType, Time64MicrosecondType,
    Time64NanosecondType, TimeUnit,
};
use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Timelike,
};

use super::arrow_cast;
use super::string::str_values;
use crate::error::{Error, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Widest timestamp text the server accepts (seven fractional digits).
const TIMESTAMP_TEXT_WIDTH: usize = 27;
const TIME_TEXT_WIDTH: usize = 16;

fn nanos_per(unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => NANOS_PER_SECOND,
        TimeUnit::Millisecond => 1_000_000,
        TimeUnit::Microsecond => 1_000,
        TimeUnit::Nanosecond => 1,
    }
}

fn is_utc(tz: &str) -> bool {
    matches!(
        tz.to_ascii_uppercase().as_str(),
        "UTC" | "GMT" | "ETC/UTC" | "ETC/GMT" | "Z" | "+00:00"
    )
}

fn parse_tz(name: &str) -> std::result::Result<Tz, String> {
    Tz::from_str(name).map_err(|e| format!("unknown timezone '{name}': {e}"))
}

/// Convert a value between units. Narrowing floors, and fails in safe mode
/// when it would drop a non-zero remainder.
fn convert_unit(v: i64, from: TimeUnit, to: TimeUnit, safe: bool) -> std::result::Result<i64, String> {
    let (from_n, to_n) = (nanos_per(from), nanos_per(to));
    if from_n >= to_n {
        return v
            .checked_mul(from_n / to_n)
            .ok_or_else(|| format!("{v} overflows the target unit"));
    }
    let div = to_n / from_n;
    if safe && v % div != 0 {
        return Err(format!("{v} loses precision when truncated to {to:?}"));
    }
    Ok(v.div_euclid(div))
}

fn to_naive(v: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let per_second = NANOS_PER_SECOND / nanos_per(unit);
    let secs = v.div_euclid(per_second);
    let nanos = v.rem_euclid(per_second) * nanos_per(unit);
    DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?).map(|dt| dt.naive_utc())
}

fn from_naive(ndt: NaiveDateTime, unit: TimeUnit, safe: bool) -> std::result::Result<i64, String> {
    let utc = ndt.and_utc();
    let secs = utc.timestamp();
    let nanos = i64::from(utc.timestamp_subsec_nanos());
    let per_unit = nanos_per(unit);
    if safe && nanos % per_unit != 0 {
        return Err(format!("{ndt} loses precision when truncated to {unit:?}"));
    }
    secs.checked_mul(NANOS_PER_SECOND / per_unit)
        .and_then(|v| v.checked_add(nanos / per_unit))
        .ok_or_else(|| format!("{ndt} is out of range for {unit:?}"))
}

/// Interpret a wall-clock time in `tz` and return the matching UTC time.
///
/// Ambiguous and nonexistent times resolve to the earlier of their candidate
/// instants, unless `safe` is set.
fn assume_local(ndt: NaiveDateTime, tz: &Tz, safe: bool) -> std::result::Result<NaiveDateTime, String> {
    match tz.from_local_datetime(&ndt) {
        LocalResult::Single(dt) => Ok(dt.naive_utc()),
        LocalResult::Ambiguous(earliest, _) => {
            if safe {
                Err(format!("{ndt} is ambiguous in {tz:?}"))
            } else {
                Ok(earliest.naive_utc())
            }
        }
        LocalResult::None => {
            if safe {
                return Err(format!("{ndt} does not exist in {tz:?}"));
            }
            // The gap sits between two offsets; the wider one maps to the
            // earlier instant.
            let before = tz.offset_from_utc_datetime(&(ndt - Duration::days(1))).fix();
            let after = tz.offset_from_utc_datetime(&(ndt + Duration::days(1))).fix();
            let widest = before.local_minus_utc().max(after.local_minus_utc());
            Ok(ndt - Duration::seconds(i64::from(widest)))
        }
    }
}

fn build_timestamp(values: Vec<Option<i64>>, unit: TimeUnit, tz: Option<Arc<str>>) -> ArrayRef {
    match unit {
        TimeUnit::Second => Arc::new(TimestampSecondArray::from(values).with_timezone_opt(tz)),
        TimeUnit::Millisecond => Arc::new(TimestampMillisecondArray::from(values).with_timezone_opt(tz)),
        TimeUnit::Microsecond => Arc::new(TimestampMicrosecondArray::from(values).with_timezone_opt(tz)),
        TimeUnit::Nanosecond => Arc::new(TimestampNanosecondArray::from(values).with_timezone_opt(tz)),
    }
}

fn timestamp_parts(dt: &DataType) -> Result<(TimeUnit, Option<Arc<str>>)> {
    match dt {
        DataType::Timestamp(unit, tz) => Ok((*unit, tz.clone())),
        other => Err(Error::cast("", other, other, "not a timestamp type")),
    }
}

/// Timestamp values as raw `i64` in the array's own unit.
fn raw_values(array: &dyn Array) -> Result<Vec<Option<i64>>> {
    let ints = arrow_cast(array, &DataType::Int64)?;
    Ok(ints.as_primitive::<Int64Type>().iter().collect())
}

// ── Parsing ─────────────────────────────────────────────────────────

enum Parsed {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl Parsed {
    fn date(&self) -> NaiveDate {
        match self {
            Self::Naive(ndt) => ndt.date(),
            Self::Aware(dt) => dt.date_naive(),
        }
    }

    fn time(&self) -> NaiveTime {
        match self {
            Self::Naive(ndt) => ndt.time(),
            Self::Aware(dt) => dt.time(),
        }
    }
}

const ISO_AWARE: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f %:z"];
const ISO_NAIVE: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

const LOOSE_AWARE: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y/%m/%d %H:%M:%S%.f%:z",
];
const LOOSE_NAIVE: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
    "%Y%m%dT%H%M%S",
    "%Y%m%d %H%M%S",
    "%d %b %Y %H:%M:%S%.f",
    "%b %d %Y %H:%M:%S%.f",
    "%B %d, %Y %H:%M:%S",
];
const LOOSE_DATES: &[&str] = &[
    "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d", "%d %b %Y", "%b %d %Y", "%d %B %Y", "%B %d, %Y",
];
const LOOSE_TIMES: &[&str] = &["%H:%M", "%I:%M:%S %p", "%I:%M %p", "%H%M%S"];

fn parse_iso(s: &str) -> Option<Parsed> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Parsed::Aware(dt));
    }
    if let Some(dt) = ISO_AWARE.iter().find_map(|f| DateTime::parse_from_str(s, f).ok()) {
        return Some(Parsed::Aware(dt));
    }
    if let Some(ndt) = ISO_NAIVE.iter().find_map(|f| NaiveDateTime::parse_from_str(s, f).ok()) {
        return Some(Parsed::Naive(ndt));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| Parsed::Naive(d.and_time(NaiveTime::MIN)))
}

/// Best-effort parse over common layouts, tried after the ISO forms.
fn parse_loose(s: &str) -> Option<Parsed> {
    if let Some(parsed) = parse_iso(s) {
        return Some(parsed);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(Parsed::Aware(dt));
    }
    if let Some(dt) = LOOSE_AWARE.iter().find_map(|f| DateTime::parse_from_str(s, f).ok()) {
        return Some(Parsed::Aware(dt));
    }
    if let Some(ndt) = LOOSE_NAIVE.iter().find_map(|f| NaiveDateTime::parse_from_str(s, f).ok()) {
        return Some(Parsed::Naive(ndt));
    }
    LOOSE_DATES
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .map(|d| Parsed::Naive(d.and_time(NaiveTime::MIN)))
}

fn parse_with_fallback(s: &str, safe: bool) -> Option<Parsed> {
    let s = s.trim();
    if safe {
        parse_iso(s)
    } else {
        parse_loose(s)
    }
}

// ── Casts ───────────────────────────────────────────────────────────

pub(super) fn string_to_timestamp(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let (unit, tz) = timestamp_parts(to)?;
    let local_tz = match tz.as_deref() {
        Some(name) if !is_utc(name) => {
            Some(parse_tz(name).map_err(|e| Error::cast("", array.data_type(), to, e))?)
        }
        _ => None,
    };
    let fail = |reason: String| Error::cast("", array.data_type(), to, reason);

    let mut values = Vec::with_capacity(array.len());
    for value in str_values(array.as_ref())? {
        let Some(s) = value else {
            values.push(None);
            continue;
        };
        let parsed = parse_with_fallback(s, safe)
            .ok_or_else(|| fail(format!("cannot parse '{s}' as a timestamp")))?;
        let utc = match (parsed, &local_tz) {
            (Parsed::Aware(dt), _) => dt.naive_utc(),
            (Parsed::Naive(ndt), Some(zone)) => assume_local(ndt, zone, safe).map_err(fail)?,
            (Parsed::Naive(ndt), None) => ndt,
        };
        values.push(Some(from_naive(utc, unit, safe).map_err(fail)?));
    }
    Ok(build_timestamp(values, unit, tz))
}

pub(super) fn string_to_date(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let epoch = NaiveDate::default();
    let mut days = Vec::with_capacity(array.len());
    for value in str_values(array.as_ref())? {
        let Some(s) = value else {
            days.push(None);
            continue;
        };
        let trimmed = s.trim();
        let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .or_else(|| if safe { None } else { parse_loose(trimmed).map(|p| p.date()) })
            .ok_or_else(|| Error::cast("", array.data_type(), to, format!("cannot parse '{s}' as a date")))?;
        let n = i32::try_from((date - epoch).num_days())
            .map_err(|_| Error::cast("", array.data_type(), to, format!("'{s}' is out of range")))?;
        days.push(Some(n));
    }
    match to {
        DataType::Date64 => Ok(Arc::new(Date64Array::from(
            days.into_iter()
                .map(|d| d.map(|d| i64::from(d) * 86_400_000))
                .collect::<Vec<_>>(),
        ))),
        _ => Ok(Arc::new(Date32Array::from(days))),
    }
}

fn time_of_day(t: NaiveTime, unit: TimeUnit, safe: bool) -> std::result::Result<i64, String> {
    let nanos = i64::from(t.nanosecond());
    let per_unit = nanos_per(unit);
    if safe && nanos % per_unit != 0 {
        return Err(format!("{t} loses precision when truncated to {unit:?}"));
    }
    Ok(i64::from(t.num_seconds_from_midnight()) * (NANOS_PER_SECOND / per_unit) + nanos / per_unit)
}

pub(super) fn string_to_time(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let unit = match to {
        DataType::Time32(unit) | DataType::Time64(unit) => *unit,
        other => return Err(Error::cast("", array.data_type(), other, "not a time type")),
    };
    let fail = |reason: String| Error::cast("", array.data_type(), to, reason);
    let mut values = Vec::with_capacity(array.len());
    for value in str_values(array.as_ref())? {
        let Some(s) = value else {
            values.push(None);
            continue;
        };
        let trimmed = s.trim();
        let time = NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
            .ok()
            .or_else(|| {
                if safe {
                    return None;
                }
                LOOSE_TIMES
                    .iter()
                    .find_map(|f| NaiveTime::parse_from_str(trimmed, f).ok())
                    .or_else(|| parse_loose(trimmed).map(|p| p.time()))
            })
            .ok_or_else(|| fail(format!("cannot parse '{s}' as a time")))?;
        values.push(Some(time_of_day(time, unit, safe).map_err(fail)?));
    }
    let narrow = |values: Vec<Option<i64>>| -> Vec<Option<i32>> {
        // Seconds and milliseconds of a day always fit in i32.
        values.into_iter().map(|v| v.map(|v| v as i32)).collect()
    };
    let out: ArrayRef = match (to, unit) {
        (DataType::Time32(_), TimeUnit::Second) => Arc::new(Time32SecondArray::from(narrow(values))),
        (DataType::Time32(_), _) => Arc::new(Time32MillisecondArray::from(narrow(values))),
        (_, TimeUnit::Microsecond) => Arc::new(Time64MicrosecondArray::from(values)),
        _ => Arc::new(Time64NanosecondArray::from(values)),
    };
    Ok(out)
}

/// Convert between timestamp units and zones.
///
/// A naive source headed for a non-UTC zone is read as wall-clock time in
/// that zone. Every other combination keeps the stored instant.
pub(super) fn timestamp_to_timestamp(array: &ArrayRef, to: &DataType, safe: bool) -> Result<ArrayRef> {
    let (from_unit, from_tz) = timestamp_parts(array.data_type())?;
    let (to_unit, to_tz) = timestamp_parts(to)?;
    let fail = |reason: String| Error::cast("", array.data_type(), to, reason);

    let local_tz = match (&from_tz, to_tz.as_deref()) {
        (None, Some(name)) if !is_utc(name) => Some(parse_tz(name).map_err(fail)?),
        _ => None,
    };

    if local_tz.is_none() && from_unit == to_unit {
        let ints = arrow_cast(array.as_ref(), &DataType::Int64)?;
        return arrow_cast(ints.as_ref(), to);
    }

    let mut values = Vec::with_capacity(array.len());
    for v in raw_values(array.as_ref())? {
        let Some(v) = v else {
            values.push(None);
            continue;
        };
        let converted = match &local_tz {
            Some(zone) => {
                let ndt = to_naive(v, from_unit).ok_or_else(|| fail(format!("{v} is out of range")))?;
                let utc = assume_local(ndt, zone, safe).map_err(fail)?;
                from_naive(utc, to_unit, safe).map_err(fail)?
            }
            None => convert_unit(v, from_unit, to_unit, safe).map_err(fail)?,
        };
        values.push(Some(converted));
    }
    Ok(build_timestamp(values, to_unit, to_tz))
}

// ── Text forms ──────────────────────────────────────────────────────

fn timestamp_pattern(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "%Y-%m-%d %H:%M:%S",
        TimeUnit::Millisecond => "%Y-%m-%d %H:%M:%S%.3f",
        TimeUnit::Microsecond => "%Y-%m-%d %H:%M:%S%.6f",
        TimeUnit::Nanosecond => "%Y-%m-%d %H:%M:%S%.9f",
    }
}

fn time_pattern(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "%H:%M:%S",
        TimeUnit::Millisecond => "%H:%M:%S%.3f",
        TimeUnit::Microsecond => "%H:%M:%S%.6f",
        TimeUnit::Nanosecond => "%H:%M:%S%.9f",
    }
}

/// Render a timestamp column as server-ready text. Zoned values are written
/// in UTC; nanosecond values are cut to seven fractional digits.
pub(crate) fn format_timestamp(array: &dyn Array) -> Result<ArrayRef> {
    let (unit, _) = timestamp_parts(array.data_type())?;
    let pattern = timestamp_pattern(unit);
    let mut builder = StringBuilder::with_capacity(array.len(), array.len() * TIMESTAMP_TEXT_WIDTH);
    for v in raw_values(array)? {
        match v.and_then(|v| to_naive(v, unit)) {
            Some(ndt) => {
                let mut text = ndt.format(pattern).to_string();
                text.truncate(TIMESTAMP_TEXT_WIDTH);
                builder.append_value(text);
            }
            None => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn time_values(array: &dyn Array) -> Result<(TimeUnit, Vec<Option<i64>>)> {
    let widen = |it: &mut dyn Iterator<Item = Option<i32>>| -> Vec<Option<i64>> {
        it.map(|v| v.map(i64::from)).collect()
    };
    let out = match array.data_type() {
        DataType::Time32(TimeUnit::Second) => {
            (TimeUnit::Second, widen(&mut array.as_primitive::<Time32SecondType>().iter()))
        }
        DataType::Time32(TimeUnit::Millisecond) => (
            TimeUnit::Millisecond,
            widen(&mut array.as_primitive::<Time32MillisecondType>().iter()),
        ),
        DataType::Time64(TimeUnit::Microsecond) => (
            TimeUnit::Microsecond,
            array.as_primitive::<Time64MicrosecondType>().iter().collect(),
        ),
        DataType::Time64(TimeUnit::Nanosecond) => (
            TimeUnit::Nanosecond,
            array.as_primitive::<Time64NanosecondType>().iter().collect(),
        ),
        other => return Err(Error::cast("", other, &DataType::Utf8, "not a time column")),
    };
    Ok(out)
}

/// Render a time column as text; nanosecond values are cut to 16 characters.
pub(crate) fn format_time(array: &dyn Array) -> Result<ArrayRef> {
    let (unit, values) = time_values(array)?;
    let pattern = time_pattern(unit);
    let per_second = NANOS_PER_SECOND / nanos_per(unit);
    let mut builder = StringBuilder::with_capacity(array.len(), array.len() * TIME_TEXT_WIDTH);
    for v in values {
        let time = v.and_then(|v| {
            let secs = u32::try_from(v.div_euclid(per_second)).ok()?;
            let nanos = u32::try_from(v.rem_euclid(per_second) * nanos_per(unit)).ok()?;
            NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        });
        match time {
            Some(t) => {
                let mut text = t.format(pattern).to_string();
                text.truncate(TIME_TEXT_WIDTH);
                builder.append_value(text);
            }
            None => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}
