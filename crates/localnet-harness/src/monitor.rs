//! Network bootstrap monitor.
//!
//! Each round fans out one status check per node that is not yet ready and
//! joins them. Per-partition readiness latches once seen, and so does
//! node readiness, so a node is never queried again after it passes. The
//! readiness signal is settled once, after the round in which the last node
//! passes both gates.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use localnet_core::{CancelToken, Cancelled, NetworkReady, ReadinessSender};
use localnet_rpc::InfoApi;
use tokio::time::Instant;

/// Per-node view of bootstrap progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeProgress {
    /// Partitions seen bootstrapped
    pub bootstrapped: BTreeSet<String>,
    /// Last peer count observed
    pub peers: Option<usize>,
    /// Passed every gate
    pub ready: bool,
}

/// Polls every node until all are bootstrapped and fully peered.
pub struct BootstrapMonitor {
    nodes: Vec<Arc<dyn InfoApi>>,
    partitions: Vec<String>,
    interval: Duration,
    min_peers: usize,
    progress: Vec<NodeProgress>,
}

impl BootstrapMonitor {
    /// Monitor `nodes`, requiring every partition in `partitions` and `nodes.len() - 1` peers.
    pub fn new(nodes: Vec<Arc<dyn InfoApi>>, partitions: Vec<String>, interval: Duration) -> Self {
        let min_peers = nodes.len().saturating_sub(1);
        let progress = vec![NodeProgress::default(); nodes.len()];
        Self {
            nodes,
            partitions,
            interval,
            min_peers,
            progress,
        }
    }

    /// Peer count each node must reach
    pub fn min_peers(&self) -> usize {
        self.min_peers
    }

    /// Progress of every node so far
    pub fn progress(&self) -> &[NodeProgress] {
        &self.progress
    }

    /// Number of nodes that passed both gates
    pub fn ready_count(&self) -> usize {
        self.progress.iter().filter(|p| p.ready).count()
    }

    /// Poll until every node is ready, then settle `signal`.
    pub async fn run(
        mut self,
        token: &CancelToken,
        signal: ReadinessSender,
    ) -> Result<NetworkReady, Cancelled> {
        let ready = self.wait_until_ready(token).await?;
        tracing::info!(
            nodes = ready.node_count,
            rounds = ready.rounds,
            elapsed_ms = ready.elapsed.as_millis() as u64,
            "network bootstrapped"
        );
        signal.settle(ready.clone());
        Ok(ready)
    }

    /// Poll until every node is ready. Returns promptly on cancellation.
    pub async fn wait_until_ready(
        &mut self,
        token: &CancelToken,
    ) -> Result<NetworkReady, Cancelled> {
        let started = Instant::now();
        let mut rounds = 0u32;

        loop {
            token.check()?;
            rounds += 1;
            token.run_until_cancelled(self.poll_round()).await?;

            let ready = self.ready_count();
            if ready == self.nodes.len() {
                return Ok(NetworkReady {
                    node_count: ready,
                    rounds,
                    elapsed: started.elapsed(),
                });
            }

            tracing::info!(
                ready,
                total = self.nodes.len(),
                round = rounds,
                "waiting for nodes to bootstrap"
            );
            token.sleep(self.interval).await?;
        }
    }

    async fn poll_round(&mut self) {
        let partitions = &self.partitions;
        let min_peers = self.min_peers;
        let checks = self
            .nodes
            .iter()
            .zip(self.progress.iter_mut())
            .enumerate()
            .filter(|(_, (_, progress))| !progress.ready)
            .map(|(index, (node, progress))| {
                check_node(index, node.as_ref(), progress, partitions, min_peers)
            });
        join_all(checks).await;
    }
}

async fn check_node(
    index: usize,
    node: &dyn InfoApi,
    progress: &mut NodeProgress,
    partitions: &[String],
    min_peers: usize,
) {
    for partition in partitions {
        if progress.bootstrapped.contains(partition) {
            continue;
        }
        match node.is_bootstrapped(partition).await {
            Ok(true) => {
                tracing::debug!(node = index, partition = %partition, "partition bootstrapped");
                progress.bootstrapped.insert(partition.clone());
            }
            Ok(false) => return,
            Err(err) => {
                tracing::debug!(
                    node = index,
                    partition = %partition,
                    error = %err,
                    "status query failed"
                );
                return;
            }
        }
    }

    match node.peer_count().await {
        Ok(peers) => {
            progress.peers = Some(peers);
            if peers >= min_peers {
                tracing::info!(node = index, peers, "node ready");
                progress.ready = true;
            }
        }
        Err(err) => tracing::debug!(node = index, error = %err, "peer query failed"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use localnet_core::{readiness_signal, CancellationSource};
    use localnet_testkit::ScriptedNodeStatus;

    fn partitions() -> Vec<String> {
        ["P", "C", "X"].iter().map(|p| p.to_string()).collect()
    }

    fn nodes(
        scripts: Vec<ScriptedNodeStatus>,
    ) -> (Vec<Arc<ScriptedNodeStatus>>, Vec<Arc<dyn InfoApi>>) {
        let scripts: Vec<_> = scripts.into_iter().map(Arc::new).collect();
        let apis = scripts
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn InfoApi>)
            .collect();
        (scripts, apis)
    }

    #[tokio::test(start_paused = true)]
    async fn settles_once_every_node_passes() {
        let (_, apis) = nodes((0..5).map(|_| ScriptedNodeStatus::ready_after(2, 4)).collect());
        let (tx, watch) = readiness_signal();
        let monitor = BootstrapMonitor::new(apis, partitions(), Duration::from_secs(1));
        let source = CancellationSource::new();

        let ready = monitor.run(&source.token(), tx).await.unwrap();
        assert_eq!(ready.node_count, 5);
        assert_eq!(ready.rounds, 2);
        assert_eq!(watch.current(), Some(ready));
    }

    #[tokio::test(start_paused = true)]
    async fn one_node_short_of_peers_keeps_signal_unsettled() {
        let mut scripts: Vec<_> = (0..4).map(|_| ScriptedNodeStatus::ready_after(1, 4)).collect();
        scripts.push(ScriptedNodeStatus::ready_after(1, 3));
        let (_, apis) = nodes(scripts);
        let (tx, watch) = readiness_signal();
        let monitor = BootstrapMonitor::new(apis, partitions(), Duration::from_secs(1));
        let source = CancellationSource::new();
        let token = source.token();

        let task = tokio::spawn(async move { monitor.run(&token, tx).await });
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!watch.is_ready());
        assert!(!task.is_finished());

        source.cancel();
        assert_eq!(task.await.unwrap(), Err(Cancelled));
        assert!(!watch.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_nodes_are_retried() {
        let (scripts, apis) = nodes(vec![
            ScriptedNodeStatus::ready_after(1, 1).unreachable_for(3),
            ScriptedNodeStatus::ready_after(1, 1),
        ]);
        let mut monitor = BootstrapMonitor::new(apis, partitions(), Duration::from_secs(1));

        let ready = monitor.wait_until_ready(&CancelToken::never()).await.unwrap();
        assert_eq!(ready.rounds, 4);
        assert_eq!(scripts[1].partition_polls("P"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrapped_partitions_are_not_requeried() {
        let (scripts, apis) = nodes(vec![
            ScriptedNodeStatus::ready_after(3, 1),
            ScriptedNodeStatus::ready_after(1, 1),
        ]);
        let mut monitor = BootstrapMonitor::new(apis, partitions(), Duration::from_secs(1));

        monitor.wait_until_ready(&CancelToken::never()).await.unwrap();
        assert_eq!(scripts[1].partition_polls("P"), 1);
        assert_eq!(scripts[1].partition_polls("X"), 1);
        assert!(monitor.progress().iter().all(|p| p.ready));
        assert_eq!(monitor.min_peers(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_returns_within_one_interval() {
        let (_, apis) = nodes(vec![ScriptedNodeStatus::never_ready(0)]);
        let mut monitor = BootstrapMonitor::new(apis, partitions(), Duration::from_secs(5));
        let source = CancellationSource::new();
        let token = source.token();

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(7_500)).await;
            source.cancel();
            Instant::now()
        };
        let (result, cancelled_at) = tokio::join!(monitor.wait_until_ready(&token), canceller);
        assert_eq!(result, Err(Cancelled));
        assert!(Instant::now() - cancelled_at <= Duration::from_secs(5));
    }
}
