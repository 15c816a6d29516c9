//! In-memory driver that records statements instead of sending them.
//!
//! Useful for dry runs and tests. Clones share one log, so a handle kept by
//! the caller observes everything done through sessions built from it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use msarrow_types::{ColumnDescription, DriverError, SqlValue};

use super::{Connector, DatabaseDriver};

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute {
        sql: String,
        params: Vec<SqlValue<'static>>,
    },
    ExecuteMany {
        sql: String,
        param_rows: Vec<Vec<SqlValue<'static>>>,
    },
    Commit,
    Rollback,
    Close,
}

impl Call {
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execute { sql, .. } | Self::ExecuteMany { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

struct FailureRule {
    pattern: String,
    remaining: usize,
    error: DriverError,
}

type Inspector = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    failures: Vec<FailureRule>,
    rows: VecDeque<Vec<SqlValue<'static>>>,
    description: Option<Vec<ColumnDescription>>,
    inspector: Option<Inspector>,
    connections: usize,
}

/// Statement-recording [`DatabaseDriver`].
#[derive(Clone, Default)]
pub struct RecordingDriver {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for RecordingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RecordingDriver")
            .field("calls", &state.calls.len())
            .field("connections", &state.connections)
            .finish()
    }
}

impl RecordingDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `times` statements whose text contains `pattern`.
    #[must_use]
    pub fn fail_matching(self, pattern: impl Into<String>, times: usize, error: DriverError) -> Self {
        self.lock().failures.push(FailureRule {
            pattern: pattern.into(),
            remaining: times,
            error,
        });
        self
    }

    /// Queue rows to be returned by `fetch_rows`.
    #[must_use]
    pub fn with_rows(self, rows: Vec<Vec<SqlValue<'static>>>) -> Self {
        self.lock().rows.extend(rows);
        self
    }

    #[must_use]
    pub fn with_description(self, description: Vec<ColumnDescription>) -> Self {
        self.lock().description = Some(description);
        self
    }

    /// Call `f` with the text of every statement before it is recorded.
    #[must_use]
    pub fn inspect(self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.lock().inspector = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Text of every executed statement, in order, including failed attempts.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| c.sql().map(str::to_owned))
            .collect()
    }

    /// Number of sessions opened through the [`Connector`] impl.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    fn record(&self, call: Call) -> Result<(), DriverError> {
        let inspector = self.lock().inspector.clone();
        if let (Some(inspect), Some(sql)) = (inspector, call.sql()) {
            inspect(sql);
        }
        let mut state = self.lock();
        let failure = call.sql().and_then(|sql| {
            state
                .failures
                .iter_mut()
                .find(|rule| rule.remaining > 0 && sql.contains(&rule.pattern))
                .map(|rule| {
                    rule.remaining -= 1;
                    rule.error.clone()
                })
        });
        state.calls.push(call);
        failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl DatabaseDriver for RecordingDriver {
    async fn execute(&mut self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64, DriverError> {
        self.record(Call::Execute {
            sql: sql.to_owned(),
            params: params.iter().cloned().map(SqlValue::into_owned).collect(),
        })?;
        Ok(1)
    }

    async fn execute_many(
        &mut self,
        sql: &str,
        param_rows: &[Vec<SqlValue<'_>>],
    ) -> Result<u64, DriverError> {
        self.record(Call::ExecuteMany {
            sql: sql.to_owned(),
            param_rows: param_rows
                .iter()
                .map(|row| row.iter().cloned().map(SqlValue::into_owned).collect())
                .collect(),
        })?;
        Ok(param_rows.len() as u64)
    }

    async fn fetch_rows(&mut self, n: usize) -> Result<Vec<Vec<SqlValue<'static>>>, DriverError> {
        let mut state = self.lock();
        let take = n.min(state.rows.len());
        Ok(state.rows.drain(..take).collect())
    }

    fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.lock().description.clone()
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.record(Call::Commit)
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.record(Call::Rollback)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.record(Call::Close)
    }
}

#[async_trait]
impl Connector for RecordingDriver {
    async fn connect(&self) -> Result<Box<dyn DatabaseDriver>, DriverError> {
        self.lock().connections += 1;
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let log = RecordingDriver::new();
        let mut driver = log.clone();
        driver.execute("SELECT 1", &[SqlValue::I32(1)]).await.unwrap();
        driver.commit().await.unwrap();
        assert_eq!(
            log.calls(),
            vec![
                Call::Execute {
                    sql: "SELECT 1".into(),
                    params: vec![SqlValue::I32(1)]
                },
                Call::Commit
            ]
        );
    }

    #[tokio::test]
    async fn scripted_failures_run_out() {
        let mut driver =
            RecordingDriver::new().fail_matching("INSERT", 2, DriverError::new("deadlocked"));
        assert!(driver.execute("INSERT x", &[]).await.is_err());
        assert!(driver.execute("SELECT 1", &[]).await.is_ok());
        assert!(driver.execute("INSERT x", &[]).await.is_err());
        assert!(driver.execute("INSERT x", &[]).await.is_ok());
        assert_eq!(driver.statements().len(), 4);
    }

    #[tokio::test]
    async fn fetch_drains_queued_rows() {
        let mut driver = RecordingDriver::new().with_rows(vec![
            vec![SqlValue::I64(1)],
            vec![SqlValue::I64(2)],
            vec![SqlValue::I64(3)],
        ]);
        assert_eq!(driver.fetch_rows(2).await.unwrap().len(), 2);
        assert_eq!(driver.fetch_rows(2).await.unwrap().len(), 1);
        assert!(driver.fetch_rows(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn connector_shares_the_log() {
        let log = RecordingDriver::new();
        let mut session = log.connect().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(log.connections(), 1);
        assert_eq!(log.calls(), vec![Call::Close]);
    }
}
