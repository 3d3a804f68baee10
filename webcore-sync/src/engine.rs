//! The execution model shared by every sync surface (§4.3.7 /
//! §5): semaphore-capped concurrency, linear retry backoff, and a
//! run-wide timeout. Grounded on `sync_with_strategy`,
//! `_execute_parallel_sync`, `_execute_sequential_sync`, and
//! `_execute_with_retry` in
//! `examples/original_source/fastblocks/actions/sync/strategies.py`.
//!
//! The original retries by re-`await`ing the same coroutine object, which
//! is not something a Rust `Future` supports (it can only be polled to
//! completion once) — here a [`SyncTaskFn`] is a thunk that produces a
//! fresh future on every attempt instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::SyncError;
use crate::result::SyncTaskError;
use crate::strategy::SyncStrategy;

/// A boxed, `Send` future, the shape every per-file sync task produces.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
/// The outcome of a single attempt at a sync task.
pub type TaskResult<T> = std::result::Result<T, SyncTaskError>;
/// A retryable unit of sync work: called fresh on every attempt.
pub type SyncTaskFn<T> = Box<dyn Fn() -> BoxFuture<TaskResult<T>> + Send + Sync>;

/// The outcome of running a batch of [`SyncTaskFn`]s under a
/// [`SyncStrategy`]: every task's successful output, plus every task's
/// terminal (post-retry) failure. Never includes a partially-retried
/// failure — only the last attempt's error survives.
#[derive(Debug)]
pub struct EngineRun<T> {
    pub outcomes: Vec<T>,
    pub errors: Vec<SyncTaskError>,
}

/// Run `tasks` to completion under `strategy`: in parallel (semaphore-capped
/// at `strategy.max_concurrent`) when `strategy.parallel` and there's more
/// than one task, sequentially otherwise. Each task gets up to
/// `strategy.retry_attempts` retries with a linearly increasing delay
/// (`strategy.retry_delay * attempt`). The whole run is bounded by
/// `strategy.timeout`; exceeding it yields [`SyncError::Timeout`] instead
/// of an [`EngineRun`] — every task still in flight is dropped, matching
/// the original's `asyncio.wait_for` cancellation.
pub async fn run_tasks<T: Send + 'static>(
    tasks: Vec<SyncTaskFn<T>>,
    strategy: &SyncStrategy,
) -> std::result::Result<EngineRun<T>, SyncError> {
    let run = async {
        if strategy.parallel && tasks.len() > 1 {
            run_parallel(tasks, strategy).await
        } else {
            run_sequential(tasks, strategy).await
        }
    };

    tokio::time::timeout(strategy.timeout, run).await.map_err(|_| SyncError::Timeout(strategy.timeout))
}

async fn run_parallel<T: Send + 'static>(
    tasks: Vec<SyncTaskFn<T>>,
    strategy: &SyncStrategy,
) -> EngineRun<T> {
    let semaphore = Arc::new(Semaphore::new(strategy.max_concurrent.max(1)));
    let retry_attempts = strategy.retry_attempts;
    let retry_delay = strategy.retry_delay;

    let futures = tasks.into_iter().map(|task| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            run_with_retry(&task, retry_attempts, retry_delay).await
        }
    });

    collect(futures::future::join_all(futures).await)
}

async fn run_sequential<T: Send + 'static>(
    tasks: Vec<SyncTaskFn<T>>,
    strategy: &SyncStrategy,
) -> EngineRun<T> {
    let mut results = Vec::with_capacity(tasks.len());
    for task in &tasks {
        results.push(run_with_retry(task, strategy.retry_attempts, strategy.retry_delay).await);
    }
    collect(results)
}

async fn run_with_retry<T>(
    task: &SyncTaskFn<T>,
    retry_attempts: u32,
    retry_delay: Duration,
) -> TaskResult<T> {
    let mut attempt = 0;
    loop {
        match task().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retry_attempts => {
                log::debug!("sync task retry {} after error: {err}", attempt + 1);
                tokio::time::sleep(retry_delay * (attempt + 1)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn collect<T>(results: Vec<TaskResult<T>>) -> EngineRun<T> {
    let mut outcomes = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => outcomes.push(value),
            Err(err) => errors.push(err),
        }
    }
    EngineRun { outcomes, errors }
}
