//! Run-wide cancellation signal.
//!
//! A single `watch<bool>` backs the whole run. The source side flips it once;
//! every token observes the flip either by polling `is_cancelled` at the top
//! of a loop or by racing `cancelled()` against a sleep or a process exit.
//! Dropping every source counts as cancellation for all observers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Owner side of the run's cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    shutdown_tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// Create a fresh, uncancelled source
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// Request cancellation. Returns true only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        self.shutdown_tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Hand out an observer
    pub fn token(&self) -> CancelToken {
        CancelToken {
            shutdown_rx: self.shutdown_tx.subscribe(),
            _detached: None,
        }
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned when a wait was cut short by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Cloneable observer of the run's cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    shutdown_rx: watch::Receiver<bool>,
    // Keeps the sender alive for tokens that have no owning source.
    _detached: Option<Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// Resolves once cancellation is requested or the source is gone.
    pub async fn cancelled(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                return;
            }
            if shutdown_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking cancellation check. True once cancelled or the source is gone.
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow() || self.shutdown_rx.has_changed().is_err()
    }

    /// Fail fast if cancellation has already been requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `interval` unless cancelled first.
    pub async fn sleep(&self, interval: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(interval) => Ok(()),
        }
    }

    /// Drive `fut` to completion unless cancelled first.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }

    /// A token that is never cancelled, for callers without a run context.
    pub fn never() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_rx,
            _detached: Some(Arc::new(shutdown_tx)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_returns_early_on_cancel() {
        let source = CancellationSource::new();
        let token = source.token();

        let sleeper = tokio::spawn(async move { token.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(source.cancel());

        let started = tokio::time::Instant::now();
        assert_eq!(sleeper.await.unwrap(), Err(Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn only_first_cancel_reports_transition() {
        let source = CancellationSource::new();
        assert!(!source.is_cancelled());
        assert!(source.cancel());
        assert!(!source.cancel());
        assert!(source.token().is_cancelled());
        assert_eq!(source.token().check(), Err(Cancelled));
    }

    #[tokio::test]
    async fn tokens_created_after_cancel_see_it() {
        let source = CancellationSource::new();
        source.cancel();
        let token = source.token();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_source_cancels_every_observer_alike() {
        let source = CancellationSource::new();
        let token = source.token();
        assert_eq!(token.check(), Ok(()));
        drop(source);

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
        assert_eq!(token.sleep(Duration::from_secs(60)).await, Err(Cancelled));
        assert!(token.clone().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn never_token_lets_sleep_finish() {
        let token = CancelToken::never();
        assert_eq!(token.sleep(Duration::from_secs(5)).await, Ok(()));
        assert!(!token.is_cancelled());
    }
}
