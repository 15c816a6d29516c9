//! Align a batch's columns to a target schema by name.

use std::sync::Arc;

use arrow::array::{new_null_array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::datatypes::{Field, FieldRef, Schema, SchemaRef};

use crate::error::{Error, Result};

/// Index of the field called `name`: exact match first, then the first
/// case-insensitive match.
#[must_use]
pub fn find_field_index(schema: &Schema, name: &str) -> Option<usize> {
    let fields = schema.fields();
    fields
        .iter()
        .position(|f| f.name() == name)
        .or_else(|| fields.iter().position(|f| f.name().eq_ignore_ascii_case(name)))
}

/// Target fields that have a counterpart in `source`, in target order.
#[must_use]
pub fn intersect_schemas(source: &Schema, target: &Schema) -> SchemaRef {
    let fields: Vec<FieldRef> = target
        .fields()
        .iter()
        .filter(|f| find_field_index(source, f.name()).is_some())
        .cloned()
        .collect();
    Arc::new(Schema::new_with_metadata(fields, target.metadata().clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnSource {
    Existing(usize),
    Nulls,
}

/// How to build each output column from a batch with a known source schema.
///
/// Output columns follow the target's order and names. Existing columns
/// keep their source type; filled columns take the target type.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    schema: SchemaRef,
    sources: Vec<ColumnSource>,
}

impl ReconcilePlan {
    pub fn new(source: &Schema, target: &SchemaRef, fill_empty: bool, drop_unmatched: bool) -> Result<Self> {
        let mut fields = Vec::with_capacity(target.fields().len());
        let mut sources = Vec::with_capacity(target.fields().len());

        for field in target.fields() {
            if let Some(idx) = find_field_index(source, field.name()) {
                let found = source.field(idx);
                fields.push(
                    Field::new(field.name(), found.data_type().clone(), found.is_nullable())
                        .with_metadata(field.metadata().clone()),
                );
                sources.push(ColumnSource::Existing(idx));
            } else if fill_empty && field.is_nullable() {
                fields.push(field.as_ref().clone());
                sources.push(ColumnSource::Nulls);
            } else if drop_unmatched {
                tracing::debug!(column = %field.name(), "target column absent from input, omitted");
            } else {
                return Err(Error::MissingColumn {
                    field: field.name().clone(),
                    available: source.fields().iter().map(|f| f.name().clone()).collect(),
                });
            }
        }

        let schema = Arc::new(Schema::new_with_metadata(fields, target.metadata().clone()));
        Ok(Self { schema, sources })
    }

    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Whether the plan passes every source column straight through, in order.
    #[must_use]
    pub fn is_passthrough(&self, source_width: usize) -> bool {
        self.sources.len() == source_width
            && self
                .sources
                .iter()
                .enumerate()
                .all(|(i, s)| *s == ColumnSource::Existing(i))
    }

    pub fn apply(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let rows = batch.num_rows();
        let columns: Vec<ArrayRef> = if self.is_passthrough(batch.num_columns()) {
            batch.columns().to_vec()
        } else {
            self.sources
                .iter()
                .zip(self.schema.fields())
                .map(|(source, field)| match source {
                    ColumnSource::Existing(idx) => Arc::clone(batch.column(*idx)),
                    ColumnSource::Nulls => new_null_array(field.data_type(), rows),
                })
                .collect()
        };
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        Ok(RecordBatch::try_new_with_options(
            Arc::clone(&self.schema),
            columns,
            &options,
        )?)
    }
}

/// Align `batch` to `target`.
///
/// Matching is by name, exact then case-insensitive; output fields carry the
/// target's names and metadata. A missing target field is filled with nulls
/// when `fill_empty` is set and the field is nullable, omitted when
/// `drop_unmatched` is set, and otherwise an error.
pub fn reconcile(
    batch: &RecordBatch,
    target: &SchemaRef,
    fill_empty: bool,
    drop_unmatched: bool,
) -> Result<RecordBatch> {
    ReconcilePlan::new(batch.schema_ref(), target, fill_empty, drop_unmatched)?.apply(batch)
}
