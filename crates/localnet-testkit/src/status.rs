//! Scripted node status source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use localnet_rpc::{InfoApi, RpcError, RpcResult};
use parking_lot::Mutex;

/// Fake `InfoApi` whose answers follow a fixed script.
///
/// Each partition reports bootstrapped from its `ready_after`-th query on.
/// The first `unreachable_for` calls of any kind fail as an unreachable node.
#[derive(Debug)]
pub struct ScriptedNodeStatus {
    node_id: String,
    ready_after: u32,
    peers: usize,
    unreachable_for: u32,
    calls: AtomicU32,
    partition_polls: Mutex<HashMap<String, u32>>,
}

impl ScriptedNodeStatus {
    /// Bootstrapped on the `polls`-th query of each partition, with `peers` peers.
    pub fn ready_after(polls: u32, peers: usize) -> Self {
        Self {
            node_id: "NodeID-scripted".to_string(),
            ready_after: polls.max(1),
            peers,
            unreachable_for: 0,
            calls: AtomicU32::new(0),
            partition_polls: Mutex::new(HashMap::new()),
        }
    }

    /// Never bootstraps.
    pub fn never_ready(peers: usize) -> Self {
        Self::ready_after(u32::MAX, peers)
    }

    /// Fail the first `calls` queries as if the node were not listening yet.
    #[must_use]
    pub fn unreachable_for(mut self, calls: u32) -> Self {
        self.unreachable_for = calls;
        self
    }

    /// Node id `node_id()` reports
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Total queries received
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries received for one partition
    pub fn partition_polls(&self, partition: &str) -> u32 {
        self.partition_polls
            .lock()
            .get(partition)
            .copied()
            .unwrap_or(0)
    }

    fn record_call(&self) -> RpcResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.unreachable_for {
            return Err(RpcError::Http {
                endpoint: "scripted".to_string(),
                status: 503,
                body: "not listening yet".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InfoApi for ScriptedNodeStatus {
    async fn is_bootstrapped(&self, partition: &str) -> RpcResult<bool> {
        self.record_call()?;
        let mut polls = self.partition_polls.lock();
        let count = polls.entry(partition.to_string()).or_insert(0);
        *count += 1;
        Ok(*count >= self.ready_after)
    }

    async fn peer_count(&self) -> RpcResult<usize> {
        self.record_call()?;
        Ok(self.peers)
    }

    async fn node_id(&self) -> RpcResult<String> {
        self.record_call()?;
        Ok(self.node_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partitions_count_independently() {
        let status = ScriptedNodeStatus::ready_after(2, 4);
        assert!(!status.is_bootstrapped("P").await.unwrap());
        assert!(!status.is_bootstrapped("X").await.unwrap());
        assert!(status.is_bootstrapped("P").await.unwrap());
        assert_eq!(status.partition_polls("P"), 2);
        assert_eq!(status.peer_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn unreachable_window_then_answers() {
        let status = ScriptedNodeStatus::ready_after(1, 4).unreachable_for(2);
        assert!(status.peer_count().await.is_err());
        assert!(status.is_bootstrapped("P").await.is_err());
        assert!(status.is_bootstrapped("P").await.unwrap());
        assert_eq!(status.calls(), 3);
    }
}
