//! Seams to the network driver.
//!
//! The engine only needs parameterized execution, row fetch and transaction
//! control; wire protocol and connection setup live behind these traits.

pub mod recording;

use async_trait::async_trait;
use msarrow_types::{ColumnDescription, DriverError, SqlValue};

/// One open server session.
///
/// Statements on a session run in submission order. A session is never
/// shared between concurrent work items.
#[async_trait]
pub trait DatabaseDriver: Send {
    /// Run one statement; returns the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64, DriverError>;

    /// Run `sql` once per parameter row. Each row holds exactly as many
    /// values as the statement has placeholders, laid out row-major.
    async fn execute_many(
        &mut self,
        sql: &str,
        param_rows: &[Vec<SqlValue<'_>>],
    ) -> Result<u64, DriverError>;

    /// Fetch up to `n` rows of the current result; empty once exhausted.
    async fn fetch_rows(&mut self, n: usize) -> Result<Vec<Vec<SqlValue<'static>>>, DriverError>;

    /// Column description of the current result, if there is one.
    fn description(&self) -> Option<Vec<ColumnDescription>>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens new sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DatabaseDriver>, DriverError>;
}
