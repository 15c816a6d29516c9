//! SQL text templates.
//!
//! The generated text is part of the compatibility surface: existing server
//! tooling greps for these exact shapes, so spacing is fixed.

use msarrow_types::MAX_BOUND_PARAMETERS;

use crate::error::{Error, Result};

/// Bracket-quote an identifier, doubling any closing bracket.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// `[catalog].[schema].[name]`
#[must_use]
pub fn qualified_name(catalog: &str, schema: &str, name: &str) -> String {
    format!(
        "{}.{}.{}",
        quote_ident(catalog),
        quote_ident(schema),
        quote_ident(name)
    )
}

fn insert_prefix(table: &str, columns: &[String], tablock: bool) -> String {
    let mut sql = String::with_capacity(32 + table.len() + columns.len() * 16);
    sql.push_str("INSERT INTO ");
    sql.push_str(table);
    if tablock {
        sql.push_str("WITH(TABLOCK)");
    }
    sql.push('(');
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        sql.push_str(&quote_ident(col));
    }
    sql.push_str(") VALUES ");
    sql
}

fn placeholder_group(width: usize) -> String {
    let mut group = String::with_capacity(2 + width * 2);
    group.push('(');
    for i in 0..width {
        if i > 0 {
            group.push(',');
        }
        group.push('?');
    }
    group.push(')');
    group
}

/// Single-row insert: `INSERT INTO t[WITH(TABLOCK)]([a],[b]) VALUES (?,?)`.
pub fn insert_statement(table: &str, columns: &[String], tablock: bool) -> Result<String> {
    insert_batch_statement(table, columns, 1, tablock)
}

/// Multi-row insert with `rows` comma-joined placeholder groups.
///
/// Fails with [`Error::ParameterLimitExceeded`] if the statement would bind
/// more than the server's parameter ceiling.
pub fn insert_batch_statement(
    table: &str,
    columns: &[String],
    rows: usize,
    tablock: bool,
) -> Result<String> {
    if columns.len().saturating_mul(rows) > MAX_BOUND_PARAMETERS {
        return Err(Error::ParameterLimitExceeded {
            columns: columns.len(),
            rows,
            limit: MAX_BOUND_PARAMETERS,
        });
    }
    let mut sql = insert_prefix(table, columns, tablock);
    let group = placeholder_group(columns.len());
    sql.reserve(rows * (group.len() + 1));
    for i in 0..rows {
        if i > 0 {
            sql.push(',');
        }
        sql.push_str(&group);
    }
    Ok(sql)
}

/// Options of a `BULK INSERT` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLoadOptions {
    pub file_format: String,
    pub datafile_type: String,
    pub first_row: u32,
    pub field_quote: String,
    pub row_terminator: String,
    pub code_page: String,
    pub field_terminator: String,
    pub tablock: bool,
    /// Appended verbatim after the fixed options.
    pub other_options: Option<String>,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            file_format: "CSV".into(),
            datafile_type: "char".into(),
            first_row: 2,
            field_quote: "\"".into(),
            row_terminator: "\n".into(),
            code_page: "65001".into(),
            field_terminator: ",".into(),
            tablock: false,
            other_options: None,
        }
    }
}

/// `BULK INSERT <table> FROM '<file>' WITH (...)`.
#[must_use]
pub fn bulk_insert_statement(table: &str, file: &str, opts: &BulkLoadOptions) -> String {
    let mut options = format!(
        "FORMAT = '{}', DATAFILETYPE = '{}', FIRSTROW = {}, FIELDQUOTE = '{}', ROWTERMINATOR = '{}', CODEPAGE = '{}', FIELDTERMINATOR = '{}'",
        opts.file_format,
        opts.datafile_type,
        opts.first_row,
        opts.field_quote,
        opts.row_terminator,
        opts.code_page,
        opts.field_terminator,
    );
    if opts.tablock {
        options.push_str(", TABLOCK");
    }
    if let Some(other) = opts.other_options.as_deref().filter(|o| !o.trim().is_empty()) {
        options.push_str(", ");
        options.push_str(other);
    }
    format!(
        "BULK INSERT {table} FROM '{}' WITH ({options})",
        file.replace('\'', "''")
    )
}

#[must_use]
pub fn identity_insert_statement(table: &str, on: bool) -> String {
    format!("SET IDENTITY_INSERT {table} {}", if on { "ON" } else { "OFF" })
}

#[must_use]
pub fn truncate_statement(table: &str) -> String {
    format!("TRUNCATE TABLE {table}")
}

#[must_use]
pub fn count_statement(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table}")
}

/// Column catalog lookup for one table, ordered by position. Binds the
/// schema name and table name. String and binary columns report their
/// length as precision, with `max` as 0.
#[must_use]
pub fn column_catalog_statement(catalog: &str) -> String {
    format!(
        "SELECT c.COLUMN_NAME, c.DATA_TYPE, COALESCE(c.CHARACTER_MAXIMUM_LENGTH, 0), \
         COALESCE(NULLIF(c.CHARACTER_MAXIMUM_LENGTH, -1), c.NUMERIC_PRECISION, 0), \
         COALESCE(c.NUMERIC_SCALE, c.DATETIME_PRECISION, 0), \
         CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END, c.COLLATION_NAME, \
         COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_CATALOG) + '.' + QUOTENAME(c.TABLE_SCHEMA) \
         + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity') \
         FROM {}.INFORMATION_SCHEMA.COLUMNS c \
         WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ? \
         ORDER BY c.ORDINAL_POSITION",
        quote_ident(catalog)
    )
}
