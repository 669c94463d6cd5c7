//! Bounded worker pool shared by the validate and retrieve stages.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::warn;

/// How one pooled task ended.
#[derive(Debug)]
pub(crate) enum TaskResult<T> {
    Done(T),
    /// Still running when the run deadline passed; the task was aborted.
    TimedOut,
    /// The task panicked or was cancelled.
    Failed(String),
}

/// Run `task` over `items` with at most `workers` in flight.
///
/// Results come back in input order regardless of completion order.
/// Everything unfinished at `deadline` is aborted and reported as
/// [`TaskResult::TimedOut`].
pub(crate) async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    workers: usize,
    deadline: Instant,
    task: F,
) -> Vec<TaskResult<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));

    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let sem = semaphore.clone();
            let fut = task(item);
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await;
                fut.await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let abort = handle.abort_handle();
        let result = match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(value)) => TaskResult::Done(value),
            Ok(Err(e)) => {
                warn!(error = %e, "worker task failed");
                TaskResult::Failed(e.to_string())
            }
            Err(_) => {
                abort.abort();
                TaskResult::TimedOut
            }
        };
        results.push(result);
    }
    results
}
