//! Write-once network readiness signal.
//!
//! `readiness_signal()` returns a single `ReadinessSender` and a cloneable
//! `ReadinessWatch`. Settling consumes the sender, so a second emission is
//! unrepresentable. Readers block until the signal settles, the sender is
//! dropped unsettled, or the run is cancelled.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::cancel::CancelToken;

/// What the monitor observed when every node became ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkReady {
    /// Number of nodes that passed both gates
    pub node_count: usize,
    /// Polling rounds it took
    pub rounds: u32,
    /// Wall time from the first round to readiness
    pub elapsed: Duration,
}

/// Reasons a reader stops waiting without a ready network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadinessError {
    /// The run was cancelled first
    #[error("cancelled while waiting for network readiness")]
    Cancelled,
    /// The monitor went away without settling the signal
    #[error("readiness monitor exited without reporting")]
    Abandoned,
}

/// Single writer of the readiness signal.
#[derive(Debug)]
pub struct ReadinessSender {
    tx: watch::Sender<Option<NetworkReady>>,
}

impl ReadinessSender {
    /// Settle the signal. Consumes the sender.
    pub fn settle(self, ready: NetworkReady) {
        self.tx.send_replace(Some(ready));
    }
}

/// Reader side of the readiness signal.
#[derive(Debug, Clone)]
pub struct ReadinessWatch {
    rx: watch::Receiver<Option<NetworkReady>>,
}

impl ReadinessWatch {
    /// Current value without waiting
    pub fn current(&self) -> Option<NetworkReady> {
        self.rx.borrow().clone()
    }

    /// Whether the signal has settled
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Block until settled or cancelled.
    pub async fn wait(&self, cancel: &CancelToken) -> Result<NetworkReady, ReadinessError> {
        let mut rx = self.rx.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReadinessError::Cancelled),
            settled = rx.wait_for(Option::is_some) => match settled {
                Ok(value) => value.clone().ok_or(ReadinessError::Abandoned),
                Err(_) => Err(ReadinessError::Abandoned),
            },
        }
    }
}

/// Create a fresh, unsettled readiness signal.
pub fn readiness_signal() -> (ReadinessSender, ReadinessWatch) {
    let (tx, rx) = watch::channel(None);
    (ReadinessSender { tx }, ReadinessWatch { rx })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::cancel::CancellationSource;

    fn ready() -> NetworkReady {
        NetworkReady {
            node_count: 5,
            rounds: 2,
            elapsed: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn readers_see_settled_value() {
        let (tx, watch) = readiness_signal();
        let other = watch.clone();
        assert!(!watch.is_ready());

        tx.settle(ready());

        let cancel = CancelToken::never();
        assert_eq!(watch.wait(&cancel).await.unwrap(), ready());
        assert_eq!(other.wait(&cancel).await.unwrap().node_count, 5);
        assert_eq!(other.current(), Some(ready()));
    }

    #[tokio::test]
    async fn dropped_sender_abandons_readers() {
        let (tx, watch) = readiness_signal();
        drop(tx);
        let err = watch.wait(&CancelToken::never()).await.unwrap_err();
        assert_eq!(err, ReadinessError::Abandoned);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unblocks_waiting_reader() {
        let (_tx, watch) = readiness_signal();
        let source = CancellationSource::new();
        let token = source.token();

        let reader = tokio::spawn(async move { watch.wait(&token).await });
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!reader.is_finished());

        source.cancel();
        assert_eq!(reader.await.unwrap(), Err(ReadinessError::Cancelled));
    }
}
