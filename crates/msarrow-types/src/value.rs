//! Scalar parameter and result values exchanged with a driver.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

/// One bound parameter or fetched cell.
///
/// Text and bytes borrow from the source column where possible so a row group
/// can be bound without copying the underlying buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    Null,
    Bool(bool),
    /// `tinyint`, which is unsigned on the server.
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Exact decimal in canonical text form (`-123.4500`).
    Numeric(Cow<'a, str>),
    Text(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl<'a> SqlValue<'a> {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            Self::Null => SqlValue::Null,
            Self::Bool(v) => SqlValue::Bool(v),
            Self::U8(v) => SqlValue::U8(v),
            Self::I16(v) => SqlValue::I16(v),
            Self::I32(v) => SqlValue::I32(v),
            Self::I64(v) => SqlValue::I64(v),
            Self::F32(v) => SqlValue::F32(v),
            Self::F64(v) => SqlValue::F64(v),
            Self::Numeric(v) => SqlValue::Numeric(Cow::Owned(v.into_owned())),
            Self::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            Self::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            Self::Date(v) => SqlValue::Date(v),
            Self::Time(v) => SqlValue::Time(v),
            Self::DateTime(v) => SqlValue::DateTime(v),
            Self::DateTimeOffset(v) => SqlValue::DateTimeOffset(v),
        }
    }

    /// Integral value of the cell. Bits count as 0/1 and integral text
    /// parses; anything else is `None`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(v) => Some(i64::from(*v)),
            Self::U8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            Self::Numeric(v) | Self::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Canonical text form, used when a fetched value is parsed into a
    /// columnar type. Bytes have no text form and return `None`, as does NULL.
    #[must_use]
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        let text = match self {
            Self::Null | Self::Bytes(_) => return None,
            Self::Bool(v) => Cow::Borrowed(if *v { "true" } else { "false" }),
            Self::U8(v) => Cow::Owned(v.to_string()),
            Self::I16(v) => Cow::Owned(v.to_string()),
            Self::I32(v) => Cow::Owned(v.to_string()),
            Self::I64(v) => Cow::Owned(v.to_string()),
            Self::F32(v) => Cow::Owned(v.to_string()),
            Self::F64(v) => Cow::Owned(v.to_string()),
            Self::Numeric(v) | Self::Text(v) => Cow::Borrowed(v.as_ref()),
            Self::Date(v) => Cow::Owned(v.format("%Y-%m-%d").to_string()),
            Self::Time(v) => Cow::Owned(v.format("%H:%M:%S%.f").to_string()),
            Self::DateTime(v) => Cow::Owned(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::DateTimeOffset(v) => Cow::Owned(v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()),
        };
        Some(text)
    }
}

impl From<i64> for SqlValue<'_> {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<i32> for SqlValue<'_> {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<f64> for SqlValue<'_> {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<bool> for SqlValue<'_> {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        Self::Text(Cow::Borrowed(v))
    }
}

impl From<String> for SqlValue<'_> {
    fn from(v: String) -> Self {
        Self::Text(Cow::Owned(v))
    }
}

impl<'a, T> From<Option<T>> for SqlValue<'a>
where
    T: Into<SqlValue<'a>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_owned_detaches_borrowed_text() {
        let source = String::from("hello");
        let owned = SqlValue::Text(Cow::Borrowed(source.as_str())).into_owned();
        drop(source);
        assert_eq!(owned, SqlValue::Text(Cow::Owned("hello".into())));
    }

    #[test]
    fn integral_cells_widen() {
        assert_eq!(SqlValue::U8(7).as_i64(), Some(7));
        assert_eq!(SqlValue::Bool(true).as_i64(), Some(1));
        assert_eq!(SqlValue::Text(Cow::Borrowed(" 42 ")).as_i64(), Some(42));
        assert_eq!(SqlValue::F64(1.5).as_i64(), None);
        assert_eq!(SqlValue::Null.as_i64(), None);
    }

    #[test]
    fn option_conversion_maps_none_to_null() {
        let v: SqlValue<'_> = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: SqlValue<'_> = Some(7_i64).into();
        assert_eq!(v, SqlValue::I64(7));
    }

    #[test]
    fn text_forms() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 6)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(ts).to_text().as_deref(),
            Some("2024-01-02T03:04:05.000006")
        );
        assert_eq!(SqlValue::Bool(true).to_text().as_deref(), Some("true"));
        assert_eq!(SqlValue::Bytes(Cow::Borrowed(b"\x01")).to_text(), None);
        assert_eq!(SqlValue::Null.to_text(), None);
    }
}
