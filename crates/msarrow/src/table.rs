//! Destination tables and their cached column schema.

use std::sync::Arc;

use arrow::datatypes::{FieldRef, Schema, SchemaRef};
use msarrow_types::{CatalogColumn, SqlValue, TableKind};
use tokio::sync::RwLock;

use crate::driver::DatabaseDriver;
use crate::error::{Error, Result};
use crate::reconcile::find_field_index;
use crate::statement::{column_catalog_statement, qualified_name};
use crate::typemap::{is_identity, to_column_field};

const CATALOG_FETCH_ROWS: usize = 1024;

/// A destination table or view.
///
/// The column schema is read from the catalog on first use and kept until
/// [`TargetTable::invalidate`] is called. DDL run after that point is not
/// noticed. Share one `TargetTable` across sessions through an `Arc`.
#[derive(Debug)]
pub struct TargetTable {
    catalog: String,
    schema_name: String,
    name: String,
    kind: TableKind,
    qualified: String,
    cached: RwLock<Option<SchemaRef>>,
}

impl TargetTable {
    pub fn new(catalog: impl Into<String>, schema_name: impl Into<String>, name: impl Into<String>) -> Self {
        let (catalog, schema_name, name) = (catalog.into(), schema_name.into(), name.into());
        let qualified = qualified_name(&catalog, &schema_name, &name);
        Self {
            catalog,
            schema_name,
            name,
            kind: TableKind::BaseTable,
            qualified,
            cached: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: TableKind) -> Self {
        self.kind = kind;
        self
    }

    /// Use `schema` instead of looking the columns up.
    #[must_use]
    pub fn with_schema(self, schema: SchemaRef) -> Self {
        Self {
            cached: RwLock::new(Some(schema)),
            ..self
        }
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// `[catalog].[schema].[name]`
    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    /// Column schema, looked up through `driver` the first time.
    pub async fn schema(&self, driver: &mut dyn DatabaseDriver) -> Result<SchemaRef> {
        if let Some(schema) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(schema));
        }
        let mut slot = self.cached.write().await;
        if let Some(schema) = slot.as_ref() {
            return Ok(Arc::clone(schema));
        }
        let schema = self.lookup(driver).await?;
        *slot = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Schema if it has already been resolved.
    pub async fn cached_schema(&self) -> Option<SchemaRef> {
        self.cached.read().await.clone()
    }

    /// Forget the cached schema; the next access queries the catalog again.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
        tracing::debug!(table = %self.qualified, "schema cache invalidated");
    }

    /// Field named `name`, matched exactly first and then ignoring case.
    pub async fn field(&self, driver: &mut dyn DatabaseDriver, name: &str) -> Result<FieldRef> {
        let schema = self.schema(driver).await?;
        match find_field_index(&schema, name) {
            Some(i) => Ok(Arc::clone(&schema.fields()[i])),
            None => Err(Error::MissingColumn {
                field: name.to_owned(),
                available: schema.fields().iter().map(|f| f.name().clone()).collect(),
            }),
        }
    }

    /// Names of the identity columns.
    pub async fn identity_columns(&self, driver: &mut dyn DatabaseDriver) -> Result<Vec<String>> {
        let schema = self.schema(driver).await?;
        Ok(schema
            .fields()
            .iter()
            .filter(|f| is_identity(f))
            .map(|f| f.name().clone())
            .collect())
    }

    async fn lookup(&self, driver: &mut dyn DatabaseDriver) -> Result<SchemaRef> {
        let sql = column_catalog_statement(&self.catalog);
        let params = [
            SqlValue::from(self.schema_name.as_str()),
            SqlValue::from(self.name.as_str()),
        ];
        driver.execute(&sql, &params).await?;

        let mut fields = Vec::new();
        loop {
            let rows = driver.fetch_rows(CATALOG_FETCH_ROWS).await?;
            if rows.is_empty() {
                break;
            }
            for row in &rows {
                fields.push(to_column_field(&catalog_column(row)?)?);
            }
        }
        if fields.is_empty() {
            return Err(Error::Catalog(format!(
                "table {} not found or has no columns",
                self.qualified
            )));
        }
        tracing::debug!(table = %self.qualified, columns = fields.len(), "resolved table schema");
        Ok(Arc::new(Schema::new(fields)))
    }
}

fn text_cell(row: &[SqlValue<'_>], idx: usize) -> Result<Option<String>> {
    match row.get(idx) {
        None => Err(Error::Catalog(format!("catalog row has no column {idx}"))),
        Some(SqlValue::Null) => Ok(None),
        Some(v) => Ok(v.to_text().map(|t| t.into_owned())),
    }
}

fn int_cell(row: &[SqlValue<'_>], idx: usize) -> Result<i64> {
    match row.get(idx) {
        None => Err(Error::Catalog(format!("catalog row has no column {idx}"))),
        Some(SqlValue::Null) => Ok(0),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| Error::Catalog(format!("catalog column {idx} is not an integer: {v:?}"))),
    }
}

fn catalog_column(row: &[SqlValue<'_>]) -> Result<CatalogColumn> {
    let required = |idx: usize, what: &str| -> Result<String> {
        text_cell(row, idx)?.ok_or_else(|| Error::Catalog(format!("catalog row has a NULL {what}")))
    };
    let unsigned = |v: i64| u32::try_from(v).unwrap_or(0);
    Ok(CatalogColumn {
        name: required(0, "column name")?,
        type_name: required(1, "data type")?,
        max_length: i32::try_from(int_cell(row, 2)?).unwrap_or(-1),
        precision: unsigned(int_cell(row, 3)?),
        scale: unsigned(int_cell(row, 4)?),
        nullable: int_cell(row, 5)? != 0,
        collation: text_cell(row, 6)?,
        identity: int_cell(row, 7)? == 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::recording::RecordingDriver;
    use crate::typemap::META_COLLATION;
    use arrow::datatypes::{DataType, Field, TimeUnit};

    fn row(
        name: &'static str,
        ty: &'static str,
        len: i64,
        precision: i64,
        scale: i64,
        nullable: bool,
        identity: bool,
    ) -> Vec<SqlValue<'static>> {
        let collation = if ty.contains("char") {
            SqlValue::from("Latin1_General_CI_AS")
        } else {
            SqlValue::Null
        };
        vec![
            SqlValue::from(name),
            SqlValue::from(ty),
            SqlValue::I32(len as i32),
            SqlValue::U8(precision as u8),
            SqlValue::I32(scale as i32),
            SqlValue::I32(i32::from(nullable)),
            collation,
            SqlValue::I32(i32::from(identity)),
        ]
    }

    fn catalog_rows() -> Vec<Vec<SqlValue<'static>>> {
        vec![
            row("id", "int", 0, 10, 0, false, true),
            row("Name", "nvarchar", 50, 50, 0, true, false),
            row("created", "datetime2", 0, 0, 7, true, false),
        ]
    }

    #[tokio::test]
    async fn schema_is_looked_up_once() {
        let log = RecordingDriver::new().with_rows(catalog_rows());
        let mut driver = log.clone();
        let table = TargetTable::new("db", "dbo", "people");

        let schema = table.schema(&mut driver).await.unwrap();
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field(0).data_type(), &DataType::Int32);
        assert!(!schema.field(0).is_nullable());
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(
            schema.field(1).metadata().get(META_COLLATION).map(String::as_str),
            Some("Latin1_General_CI_AS")
        );
        assert_eq!(
            schema.field(2).data_type(),
            &DataType::Timestamp(TimeUnit::Nanosecond, None)
        );

        table.schema(&mut driver).await.unwrap();
        assert_eq!(log.statements().len(), 1);
        assert!(log.statements()[0].contains("[db].INFORMATION_SCHEMA.COLUMNS"));
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_lookup() {
        let log = RecordingDriver::new().with_rows(catalog_rows());
        let mut driver = log.clone();
        let table = TargetTable::new("db", "dbo", "people");
        table.schema(&mut driver).await.unwrap();
        table.invalidate().await;
        assert!(table.cached_schema().await.is_none());

        // No rows are queued for the second lookup.
        let err = table.schema(&mut driver).await.unwrap_err();
        assert!(matches!(err, Error::Catalog(_)), "got: {err}");
        assert_eq!(log.statements().len(), 2);
    }

    #[tokio::test]
    async fn field_lookup_ignores_case() {
        let mut driver = RecordingDriver::new().with_rows(catalog_rows());
        let table = TargetTable::new("db", "dbo", "people");
        let field = table.field(&mut driver, "name").await.unwrap();
        assert_eq!(field.name(), "Name");

        let err = table.field(&mut driver, "missing").await.unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }

    #[tokio::test]
    async fn identity_columns_come_from_the_catalog() {
        let mut driver = RecordingDriver::new().with_rows(catalog_rows());
        let table = TargetTable::new("db", "dbo", "people");
        assert_eq!(table.identity_columns(&mut driver).await.unwrap(), vec!["id"]);
    }

    #[tokio::test]
    async fn preset_schema_skips_the_catalog() {
        let log = RecordingDriver::new();
        let mut driver = log.clone();
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
        let table = TargetTable::new("db", "dbo", "t").with_schema(Arc::clone(&schema));
        assert_eq!(table.schema(&mut driver).await.unwrap(), schema);
        assert!(log.calls().is_empty());
        assert_eq!(table.qualified_name(), "[db].[dbo].[t]");
    }
}
