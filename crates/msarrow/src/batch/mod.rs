//! Columnar input handling shared by the INSERT and bulk-load paths.

pub(crate) mod csv_format;
pub(crate) mod insert;
pub(crate) mod typed_col;

use std::ops::Range;

use arrow::array::{RecordBatch, RecordBatchReader};
use arrow::datatypes::SchemaRef;
use msarrow_types::MAX_BOUND_PARAMETERS;

use crate::cast::{BatchCaster, CastSettings};
use crate::error::Result;

/// Upper bound on placeholder groups handed to one `execute_many` call, to
/// keep bound values for very large batches from piling up.
pub(crate) const EXECUTE_MANY_WINDOW: usize = 1024;

/// Columnar input accepted by the write paths.
pub enum ArrowData {
    Batch(RecordBatch),
    /// Batches sharing one declared schema.
    Table {
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    },
    /// Batches with no declared schema; each is reconciled on its own.
    Batches(Box<dyn Iterator<Item = RecordBatch> + Send>),
    /// A stream whose declared schema holds for every batch it yields.
    Reader(Box<dyn RecordBatchReader + Send>),
}

impl std::fmt::Debug for ArrowData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Batch(b) => f.debug_tuple("Batch").field(&b.num_rows()).finish(),
            Self::Table { batches, .. } => f.debug_tuple("Table").field(&batches.len()).finish(),
            Self::Batches(_) => f.write_str("Batches"),
            Self::Reader(r) => f.debug_tuple("Reader").field(&r.schema()).finish(),
        }
    }
}

impl From<RecordBatch> for ArrowData {
    fn from(batch: RecordBatch) -> Self {
        Self::Batch(batch)
    }
}

impl From<Vec<RecordBatch>> for ArrowData {
    fn from(batches: Vec<RecordBatch>) -> Self {
        Self::Batches(Box::new(batches.into_iter()))
    }
}

impl From<Box<dyn RecordBatchReader + Send>> for ArrowData {
    fn from(reader: Box<dyn RecordBatchReader + Send>) -> Self {
        Self::Reader(reader)
    }
}

type BatchIter = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

impl ArrowData {
    /// Declared schema, if the input has one, and the batches themselves.
    fn into_parts(self) -> (Option<SchemaRef>, BatchIter) {
        match self {
            Self::Batch(batch) => (Some(batch.schema()), Box::new(std::iter::once(Ok(batch)))),
            Self::Table { schema, batches } => (Some(schema), Box::new(batches.into_iter().map(Ok))),
            Self::Batches(iter) => (None, Box::new(iter.map(Ok))),
            Self::Reader(reader) => (
                Some(reader.schema()),
                Box::new(reader.map(|b| b.map_err(Into::into))),
            ),
        }
    }

    /// Reconcile and cast every batch against `target`.
    ///
    /// The plan is built once from the declared schema when there is one;
    /// schema-less iterables get a plan per batch.
    pub(crate) fn cast_to(self, target: &SchemaRef, settings: CastSettings) -> Result<CastBatches> {
        let (declared, batches) = self.into_parts();
        let caster = declared
            .map(|schema| BatchCaster::new(&schema, target, settings))
            .transpose()?;
        Ok(CastBatches {
            batches,
            caster,
            target: Some(target.clone()),
            settings,
        })
    }

    /// Pass batches through untouched.
    pub(crate) fn uncast(self) -> CastBatches {
        let (_, batches) = self.into_parts();
        CastBatches {
            batches,
            caster: None,
            target: None,
            settings: CastSettings::default(),
        }
    }
}

/// Iterator of reconciled and cast batches.
pub(crate) struct CastBatches {
    batches: BatchIter,
    caster: Option<BatchCaster>,
    target: Option<SchemaRef>,
    settings: CastSettings,
}

impl Iterator for CastBatches {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match self.batches.next()? {
            Ok(batch) => batch,
            Err(e) => return Some(Err(e)),
        };
        Some(match (&self.caster, &self.target) {
            (Some(caster), _) => caster.cast(&batch),
            (None, Some(target)) => BatchCaster::new(batch.schema_ref(), target, self.settings)
                .and_then(|caster| caster.cast(&batch)),
            (None, None) => Ok(batch),
        })
    }
}

/// Rows per statement after clamping to the bound-parameter ceiling:
/// `min(columns * commit_size, 2099) / columns`, never below one row.
///
/// A table wider than the ceiling still clamps to one row; the statement
/// builder then refuses it.
#[must_use]
pub fn safe_commit_size(commit_size: usize, columns_len: usize) -> usize {
    let commit_size = commit_size.max(1);
    if columns_len == 0 {
        return commit_size;
    }
    (columns_len.saturating_mul(commit_size).min(MAX_BOUND_PARAMETERS) / columns_len).max(1)
}

/// Row ranges of `rows` split into groups of `group` rows; the last group
/// may be shorter.
pub(crate) fn row_groups(rows: usize, group: usize) -> impl Iterator<Item = Range<usize>> {
    let group = group.max(1);
    (0..rows).step_by(group).map(move |start| start..(start + group).min(rows))
}
