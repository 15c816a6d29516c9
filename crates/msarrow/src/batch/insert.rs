//! Multi-row INSERT write path.

use std::ops::Range;
use std::time::Duration;

use msarrow_types::SqlValue;

use crate::batch::{row_groups, safe_commit_size, EXECUTE_MANY_WINDOW};
use crate::driver::DatabaseDriver;
use crate::error::{Error, Result};
use crate::statement::insert_batch_statement;

/// Deadlock retry budget for one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub retries: u32,
    /// Attempt `n` waits `n * delay`.
    pub delay: Duration,
}

/// Run `execute_many`, retrying when the server reports a deadlock.
pub(crate) async fn execute_many_with_retry(
    driver: &mut dyn DatabaseDriver,
    sql: &str,
    param_rows: &[Vec<SqlValue<'_>>],
    policy: RetryPolicy,
) -> Result<u64> {
    let mut retries = 0u32;
    loop {
        match driver.execute_many(sql, param_rows).await {
            Ok(n) => return Ok(n),
            Err(e) if e.is_transient_deadlock() && retries < policy.retries => {
                retries += 1;
                tracing::warn!(
                    attempt = retries,
                    max_retries = policy.retries,
                    error = %e,
                    "deadlock detected, retrying statement"
                );
                tokio::time::sleep(policy.delay * retries).await;
            }
            Err(e) if e.is_transient_deadlock() => {
                return Err(Error::TransientServer {
                    attempts: retries + 1,
                    source: e,
                })
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Statement shape for one write.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InsertPlan<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub commit_size: usize,
    pub tablock: bool,
    pub retry: RetryPolicy,
}

/// Write `num_rows` rows through multi-row INSERT statements.
///
/// Full groups of the clamped commit size share one statement; a shorter
/// final group gets a statement of its own. `params` yields the row-major
/// values of a row range.
pub(crate) async fn write_row_groups<'v, F>(
    driver: &mut dyn DatabaseDriver,
    plan: InsertPlan<'_>,
    num_rows: usize,
    mut params: F,
) -> Result<u64>
where
    F: FnMut(Range<usize>) -> Vec<SqlValue<'v>> + Send,
{
    if num_rows == 0 {
        return Ok(0);
    }
    let effective = safe_commit_size(plan.commit_size, plan.columns.len());
    let full_groups = num_rows / effective;
    let full_rows = full_groups * effective;

    if full_groups > 0 {
        let sql = insert_batch_statement(plan.table, plan.columns, effective, plan.tablock)?;
        let mut window = Vec::with_capacity(full_groups.min(EXECUTE_MANY_WINDOW));
        for group in row_groups(full_rows, effective) {
            window.push(params(group));
            if window.len() == EXECUTE_MANY_WINDOW {
                execute_many_with_retry(driver, &sql, &window, plan.retry).await?;
                window.clear();
            }
        }
        if !window.is_empty() {
            execute_many_with_retry(driver, &sql, &window, plan.retry).await?;
        }
    }

    if full_rows < num_rows {
        let tail = num_rows - full_rows;
        let sql = insert_batch_statement(plan.table, plan.columns, tail, plan.tablock)?;
        let group = vec![params(full_rows..num_rows)];
        execute_many_with_retry(driver, &sql, &group, plan.retry).await?;
    }

    tracing::debug!(
        table = plan.table,
        rows = num_rows,
        rows_per_statement = effective,
        "insert groups written"
    );
    Ok(num_rows as u64)
}
