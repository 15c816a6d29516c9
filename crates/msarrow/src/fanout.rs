//! Bounded concurrent fan-out of independent work items.
//!
//! Every work item runs on a session of its own, opened through a
//! [`Connector`] and closed once the item's operation returns. Results are
//! handed back in completion order. Nothing here makes the items atomic as a
//! group: work that committed before a sibling failed stays committed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::{FailurePolicy, FanOutOptions};
use crate::driver::Connector;
use crate::error::{Error, Result};
use crate::session::Session;

/// Results of a running fan-out, yielded as work items finish.
pub struct FanOut<R> {
    tasks: JoinSet<Vec<Result<R>>>,
    ready: VecDeque<Result<R>>,
    deadline: Option<(Instant, Duration)>,
    timed_out: bool,
}

impl<R> std::fmt::Debug for FanOut<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("pending_tasks", &self.tasks.len())
            .field("ready", &self.ready.len())
            .field("timed_out", &self.timed_out)
            .finish()
    }
}

/// Run `op` once per argument, at most `opts.concurrency` at a time.
///
/// Arguments are grouped into chunks of `opts.chunk_size`; a chunk runs its
/// items one after another in a single pool slot. Must be called within a
/// tokio runtime.
pub fn fan_out<A, R, F, I>(connector: Arc<dyn Connector>, op: F, args: I, opts: &FanOutOptions) -> Result<FanOut<R>>
where
    A: Send + 'static,
    R: Send + 'static,
    F: for<'s> Fn(&'s mut Session, A) -> BoxFuture<'s, Result<R>> + Send + Sync + 'static,
    I: IntoIterator<Item = A>,
{
    opts.validate()?;
    let op = Arc::new(op);
    let permits = Arc::new(Semaphore::new(opts.concurrency));
    let halted = Arc::new(AtomicBool::new(false));
    let cancel_pending = opts.failure_policy == FailurePolicy::CancelPending;

    let mut tasks = JoinSet::new();
    let mut args = args.into_iter().peekable();
    while args.peek().is_some() {
        let chunk: Vec<A> = args.by_ref().take(opts.chunk_size).collect();
        let (op, permits, halted, connector) = (
            Arc::clone(&op),
            Arc::clone(&permits),
            Arc::clone(&halted),
            Arc::clone(&connector),
        );
        tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return vec![Err(Error::TaskFailed(e.to_string()))],
            };
            let mut results = Vec::with_capacity(chunk.len());
            for arg in chunk {
                if cancel_pending && halted.load(Ordering::Acquire) {
                    tracing::debug!("skipping work item after an earlier failure");
                    continue;
                }
                let result = run_item(connector.as_ref(), op.as_ref(), arg).await;
                if result.is_err() && cancel_pending {
                    halted.store(true, Ordering::Release);
                }
                results.push(result);
            }
            results
        });
    }
    tracing::debug!(
        tasks = tasks.len(),
        concurrency = opts.concurrency,
        chunk_size = opts.chunk_size,
        "fan-out dispatched"
    );

    Ok(FanOut {
        tasks,
        ready: VecDeque::new(),
        deadline: opts.timeout().map(|t| (Instant::now() + t, t)),
        timed_out: false,
    })
}

async fn run_item<A, R, F>(connector: &dyn Connector, op: &F, arg: A) -> Result<R>
where
    F: for<'s> Fn(&'s mut Session, A) -> BoxFuture<'s, Result<R>>,
{
    let mut session = Session::connect(connector).await?;
    let result = op(&mut session, arg).await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "failed to close work item session");
    }
    result
}

impl<R: Send + 'static> FanOut<R> {
    /// Next finished result, or `None` once every item has been reported.
    ///
    /// Past the deadline this yields one [`Error::Timeout`] and then `None`.
    /// Items still running are left to finish on their own.
    pub async fn next(&mut self) -> Option<Result<R>> {
        loop {
            if let Some(result) = self.ready.pop_front() {
                return Some(result);
            }
            if self.timed_out {
                return None;
            }
            let joined = match self.deadline {
                Some((deadline, limit)) => match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        self.timed_out = true;
                        tracing::warn!(
                            outstanding = self.tasks.len(),
                            timeout_ms = limit.as_millis() as u64,
                            "fan-out timed out, abandoning outstanding work"
                        );
                        self.tasks.detach_all();
                        return Some(Err(Error::Timeout(limit)));
                    }
                },
                None => self.tasks.join_next().await,
            };
            match joined? {
                Ok(results) => self.ready.extend(results),
                Err(e) => return Some(Err(Error::TaskFailed(e.to_string()))),
            }
        }
    }

    /// Wait for every result.
    pub async fn collect(mut self) -> Vec<Result<R>> {
        let mut out = Vec::new();
        while let Some(result) = self.next().await {
            out.push(result);
        }
        out
    }
}
