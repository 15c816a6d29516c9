//! Engine error taxonomy.

use msarrow_types::DriverError;

/// Errors produced by the msarrow write and cast pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Catalog type with no columnar mapping.
    #[error("unsupported type '{type_name}', known types: {}", .known.join(", "))]
    UnsupportedType {
        type_name: String,
        known: Vec<&'static str>,
    },

    /// Reconciliation could not satisfy a target field.
    #[error("missing column '{field}', available columns: [{}]", .available.join(", "))]
    MissingColumn {
        field: String,
        available: Vec<String>,
    },

    /// A value could not be converted, or would lose information in safe mode.
    #[error("cannot cast column '{column}' from {from} to {to}: {reason}")]
    Cast {
        column: String,
        from: String,
        to: String,
        reason: String,
    },

    /// Statement would bind more parameters than the server accepts. Reaching
    /// this is a defect in the commit-size clamp.
    #[error("statement binds {columns} x {rows} parameters, over the limit of {limit}")]
    ParameterLimitExceeded {
        columns: usize,
        rows: usize,
        limit: usize,
    },

    /// Deadlock persisted after every retry.
    #[error("transient server error persisted after {attempts} attempts: {source}")]
    TransientServer {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A parameter row does not have one value per column.
    #[error("row {row} has {actual} values for {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Catalog lookup returned nothing usable for a table.
    #[error("catalog lookup failed: {0}")]
    Catalog(String),

    #[error("timed out after {0:?} waiting for outstanding work")]
    Timeout(std::time::Duration),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// A fan-out task panicked or was cancelled.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    pub(crate) fn cast(
        column: impl Into<String>,
        from: &arrow::datatypes::DataType,
        to: &arrow::datatypes::DataType,
        reason: impl Into<String>,
    ) -> Self {
        Self::Cast {
            column: column.into(),
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach a column name to a cast error raised below the batch level.
    #[must_use]
    pub(crate) fn in_column(self, name: &str) -> Self {
        match self {
            Self::Cast {
                column,
                from,
                to,
                reason,
            } if column.is_empty() => Self::Cast {
                column: name.to_owned(),
                from,
                to,
                reason,
            },
            other => other,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    #[test]
    fn unsupported_type_lists_known_names() {
        let err = Error::UnsupportedType {
            type_name: "geography".into(),
            known: vec!["int", "bit"],
        };
        assert_eq!(
            err.to_string(),
            "unsupported type 'geography', known types: int, bit"
        );
    }

    #[test]
    fn missing_column_names_field_and_available() {
        let err = Error::MissingColumn {
            field: "id".into(),
            available: vec!["name".into(), "age".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'id'"), "got: {msg}");
        assert!(msg.contains("[name, age]"), "got: {msg}");
    }

    #[test]
    fn driver_error_is_transparent() {
        let err: Error = DriverError::new("Invalid column name 'x'.").into();
        assert_eq!(err.to_string(), "Invalid column name 'x'.");
    }

    #[test]
    fn in_column_only_fills_blank_names() {
        let err = Error::cast("", &DataType::Utf8, &DataType::Int32, "bad").in_column("qty");
        assert!(err.to_string().contains("'qty'"));
        let err = Error::cast("a", &DataType::Utf8, &DataType::Int32, "bad").in_column("b");
        assert!(err.to_string().contains("'a'"));
    }
}
