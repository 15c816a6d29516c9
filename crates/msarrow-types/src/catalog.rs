//! Catalog descriptors handed over by metadata queries and drivers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of relation a target name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    #[serde(rename = "BASE TABLE")]
    BaseTable,
    #[serde(rename = "VIEW")]
    View,
}

impl TableKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BaseTable => "BASE TABLE",
            Self::View => "VIEW",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BASE TABLE" | "U" => Ok(Self::BaseTable),
            "VIEW" | "V" => Ok(Self::View),
            other => Err(format!("unknown table type '{other}'")),
        }
    }
}

/// One row of the column catalog for a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    /// Server type name, e.g. `nvarchar` or `datetime2`.
    pub type_name: String,
    /// Byte length; `-1` for `max` types.
    pub max_length: i32,
    pub precision: u32,
    pub scale: u32,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(default)]
    pub identity: bool,
}

/// Type category reported in a driver's result description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionTypeCode {
    Bytes,
    Str,
    Bool,
    Int,
    Float,
    Decimal,
    Date,
    Time,
    DateTime,
}

/// Column description of a result set, as exposed by the driver cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub type_code: DescriptionTypeCode,
    #[serde(default)]
    pub internal_size: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    pub nullable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_kind_parses_catalog_spellings() {
        assert_eq!("BASE TABLE".parse::<TableKind>().unwrap(), TableKind::BaseTable);
        assert_eq!("view".parse::<TableKind>().unwrap(), TableKind::View);
        assert_eq!("U ".parse::<TableKind>().unwrap(), TableKind::BaseTable);
        assert!("SYNONYM".parse::<TableKind>().is_err());
    }

    #[test]
    fn table_kind_serializes_like_information_schema() {
        let json = serde_json::to_string(&TableKind::BaseTable).unwrap();
        assert_eq!(json, r#""BASE TABLE""#);
    }

    #[test]
    fn catalog_column_defaults() {
        let col: CatalogColumn = serde_json::from_str(
            r#"{"name":"id","type_name":"int","max_length":4,"precision":10,"scale":0,"nullable":false}"#,
        )
        .unwrap();
        assert!(!col.identity);
        assert_eq!(col.collation, None);
    }
}
