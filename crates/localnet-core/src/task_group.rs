//! Cancellable task group with first-error-wins semantics.
//!
//! Every task in the group shares one `CancellationSource`. The first task
//! that fails with a non-cancellation error cancels all siblings; the group
//! then drains the remaining tasks and reports that first error. Errors that
//! arrive after the run is already cancelling are logged and dropped.
//!
//! Tasks are expected to observe cancellation within one poll interval.
//! Anything still running after `shutdown_grace` is aborted.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::task::{Id, JoinSet};
use tokio::time::Instant;

use crate::cancel::{CancelToken, CancellationSource};

/// Errors the group can classify as "expected shutdown".
pub trait CancellationAware {
    /// True when the error only reports that the task observed cancellation.
    fn is_cancellation(&self) -> bool;
}

/// A task panicked or was torn down by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task {task} panicked: {message}")]
pub struct TaskPanic {
    /// Name the task was spawned under
    pub task: String,
    /// Panic payload rendered as text
    pub message: String,
}

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Structured group of run tasks sharing one cancellation signal.
pub struct TaskGroup<E> {
    source: CancellationSource,
    tasks: JoinSet<(String, Result<(), E>)>,
    names: HashMap<Id, String>,
    shutdown_grace: Duration,
}

impl<E> TaskGroup<E>
where
    E: CancellationAware + From<TaskPanic> + std::fmt::Display + Send + 'static,
{
    /// Create a group with its own cancellation source.
    pub fn new() -> Self {
        Self::with_source(CancellationSource::new())
    }

    /// Create a group around an existing source, e.g. one a signal handler also holds.
    pub fn with_source(source: CancellationSource) -> Self {
        Self {
            source,
            tasks: JoinSet::new(),
            names: HashMap::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// How long to wait for tasks after cancellation before aborting them.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Observer for tasks that need to watch the shared signal.
    pub fn token(&self) -> CancelToken {
        self.source.token()
    }

    /// Handle that can cancel the group without reporting an error.
    pub fn source(&self) -> CancellationSource {
        self.source.clone()
    }

    /// Number of tasks not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when no tasks are pending
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a named task into the group.
    pub fn spawn<F>(&mut self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let name = name.into();
        let label = name.clone();
        let handle = self.tasks.spawn(async move { (label, fut.await) });
        self.names.insert(handle.id(), name);
    }

    /// Wait for every task and return the first fatal error, if any.
    ///
    /// When the only errors are cancellations, the first of those is returned
    /// so callers can tell an interrupted run from a completed one.
    pub async fn join(mut self) -> Result<(), E> {
        let token = self.source.token();
        let mut first_error: Option<E> = None;
        let mut first_cancellation: Option<E> = None;
        let mut deadline: Option<Instant> = None;
        let mut aborted = false;

        loop {
            let joined = match deadline {
                _ if aborted => self.tasks.join_next().await,
                None => {
                    tokio::select! {
                        joined = self.tasks.join_next() => joined,
                        _ = token.cancelled() => {
                            deadline = Some(Instant::now() + self.shutdown_grace);
                            continue;
                        }
                    }
                }
                Some(at) => match tokio::time::timeout_at(at, self.tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(
                            remaining = self.tasks.len(),
                            "tasks ignored cancellation; aborting"
                        );
                        self.tasks.abort_all();
                        aborted = true;
                        continue;
                    }
                },
            };

            let Some(joined) = joined else { break };

            let (name, result) = match joined {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancelled() => continue,
                Err(err) => {
                    let task = self
                        .names
                        .remove(&err.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    let panic = TaskPanic {
                        task,
                        message: panic_message(err),
                    };
                    (panic.task.clone(), Err(E::from(panic)))
                }
            };

            match result {
                Ok(()) => tracing::debug!(task = %name, "task finished"),
                Err(err) if err.is_cancellation() => {
                    tracing::debug!(task = %name, "task stopped on cancellation");
                    if first_cancellation.is_none() {
                        first_cancellation = Some(err);
                    }
                }
                Err(err) if first_error.is_none() && !self.source.is_cancelled() => {
                    tracing::error!(task = %name, error = %err, "task failed; cancelling run");
                    self.source.cancel();
                    first_error = Some(err);
                }
                Err(err) => {
                    tracing::warn!(
                        task = %name,
                        error = %err,
                        "discarding error from cancelled run"
                    );
                }
            }
        }

        match (first_error, first_cancellation) {
            (Some(err), _) => Err(err),
            (None, Some(cancelled)) => Err(cancelled),
            (None, None) => Ok(()),
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}

impl<E> Default for TaskGroup<E>
where
    E: CancellationAware + From<TaskPanic> + std::fmt::Display + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Eq, thiserror::Error)]
    enum TestError {
        #[error("cancelled")]
        Cancelled,
        #[error("boom {0}")]
        Boom(u32),
        #[error("{0}")]
        Panic(#[from] TaskPanic),
    }

    impl CancellationAware for TestError {
        fn is_cancellation(&self) -> bool {
            matches!(self, TestError::Cancelled)
        }
    }

    fn waits_for_cancel(token: CancelToken) -> impl Future<Output = Result<(), TestError>> {
        async move {
            token.cancelled().await;
            Err(TestError::Cancelled)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_cancels_siblings_and_wins() {
        let mut group = TaskGroup::<TestError>::new();
        let stopped = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let token = group.token();
            let stopped = Arc::clone(&stopped);
            group.spawn("waiter", async move {
                token.cancelled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Cancelled)
            });
        }
        group.spawn("failing", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Err(TestError::Boom(1))
        });
        let token = group.token();
        group.spawn("late", async move {
            token.cancelled().await;
            Err(TestError::Boom(2))
        });

        assert_eq!(group.join().await, Err(TestError::Boom(1)));
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn all_ok_joins_ok() {
        let mut group = TaskGroup::<TestError>::new();
        group.spawn("a", async { Ok(()) });
        group.spawn("b", async { Ok(()) });
        assert_eq!(group.join().await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancel_reports_cancellation() {
        let source = CancellationSource::new();
        let mut group = TaskGroup::<TestError>::with_source(source.clone());
        group.spawn("waiter", waits_for_cancel(group.token()));
        group.spawn("done", async { Ok(()) });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            source.cancel();
        });

        assert_eq!(group.join().await, Err(TestError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_task_is_aborted_after_grace() {
        let mut group = TaskGroup::<TestError>::new().shutdown_grace(Duration::from_secs(2));
        group.spawn("stubborn", async {
            std::future::pending::<()>().await;
            Ok(())
        });
        group.spawn("failing", async { Err(TestError::Boom(7)) });

        let started = Instant::now();
        assert_eq!(group.join().await, Err(TestError::Boom(7)));
        assert!(started.elapsed() <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn panic_becomes_error() {
        let mut group = TaskGroup::<TestError>::new();
        let explode = true;
        group.spawn("panicky", async move {
            if explode {
                panic!("kaboom");
            }
            Ok(())
        });
        match group.join().await {
            Err(TestError::Panic(panic)) => {
                assert!(panic.message.contains("kaboom"));
                assert_eq!(panic.task, "panicky");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_names_the_crashed_task_among_siblings() {
        let mut group = TaskGroup::<TestError>::new();
        for node in 0..3 {
            let token = group.token();
            group.spawn(format!("node-{node}"), waits_for_cancel(token));
        }
        let explode = true;
        group.spawn("provisioning", async move {
            if explode {
                panic!("workflow crashed");
            }
            Ok(())
        });

        match group.join().await {
            Err(TestError::Panic(panic)) => {
                assert_eq!(panic.task, "provisioning");
                assert_eq!(panic.to_string(), "task provisioning panicked: workflow crashed");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
