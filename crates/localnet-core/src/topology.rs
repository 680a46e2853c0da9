//! Slot topology: ports, directories and bootstrap references per node.
//!
//! Slot 0 is the bootstrap seed. Every other slot points at the seed's
//! staking address and node id, both computed from slot 0's identity and
//! ports rather than hardcoded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::{NodeId, NodeIdentity, CERT_FILE_NAME, KEY_FILE_NAME};

/// Address book entry for the seed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapPeer {
    /// `host:staking_port` of the seed
    pub address: String,
    /// Seed's derived node id
    pub node_id: NodeId,
}

/// Host and port plan shared by all slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPlan {
    /// Interface every node binds and advertises
    pub host: String,
    /// HTTP port of slot 0; slot `i` uses `base + 2i` for HTTP and `base + 2i + 1` for staking
    pub base_http_port: u16,
}

impl Default for PortPlan {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_http_port: 9650,
        }
    }
}

impl PortPlan {
    /// HTTP port for a slot
    pub fn http_port(&self, index: usize) -> u16 {
        self.base_http_port + 2 * index as u16
    }

    /// Staking (peer-to-peer) port for a slot
    pub fn staking_port(&self, index: usize) -> u16 {
        self.http_port(index) + 1
    }

    /// Highest port the plan would use for `count` nodes, if it fits in `u16`.
    pub fn last_port(&self, count: usize) -> Option<u16> {
        let span = u16::try_from(count.checked_mul(2)?).ok()?;
        self.base_http_port.checked_add(span.checked_sub(1)?)
    }
}

/// On-disk locations owned by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPaths {
    /// `node{i+1}/`
    pub node_dir: PathBuf,
    /// `node{i+1}/staker.crt`
    pub cert_file: PathBuf,
    /// `node{i+1}/staker.key`
    pub key_file: PathBuf,
    /// `node{i+1}/db/`
    pub db_dir: PathBuf,
    /// `node{i+1}/logs/`
    pub log_dir: PathBuf,
}

impl SlotPaths {
    fn under(run_dir: &Path, index: usize) -> Self {
        let node_dir = run_dir.join(format!("node{}", index + 1));
        Self {
            cert_file: node_dir.join(CERT_FILE_NAME),
            key_file: node_dir.join(KEY_FILE_NAME),
            db_dir: node_dir.join("db"),
            log_dir: node_dir.join("logs"),
            node_dir,
        }
    }
}

/// Per-node identity and placement.
#[derive(Debug, Clone)]
pub struct NodeSlot {
    /// Slot position, 0 is the seed
    pub index: usize,
    /// Identity assigned to this slot
    pub identity: Arc<NodeIdentity>,
    /// Host the node binds to
    pub host: String,
    /// HTTP API port
    pub http_port: u16,
    /// Peer-to-peer staking port
    pub staking_port: u16,
    /// Seed reference; `None` only for slot 0
    pub bootstrap: Option<BootstrapPeer>,
    /// Files and directories for the node
    pub paths: SlotPaths,
}

impl NodeSlot {
    /// Base URL of the node's HTTP API
    pub fn http_endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }

    /// `host:staking_port` peers dial
    pub fn staking_address(&self) -> String {
        format!("{}:{}", self.host, self.staking_port)
    }

    /// True for the bootstrap seed
    pub fn is_seed(&self) -> bool {
        self.bootstrap.is_none()
    }
}

/// Build one slot per identity under `run_dir`.
pub fn plan_slots(
    identities: &[Arc<NodeIdentity>],
    ports: &PortPlan,
    run_dir: &Path,
) -> Vec<NodeSlot> {
    let seed = identities.first().map(|identity| BootstrapPeer {
        address: format!("{}:{}", ports.host, ports.staking_port(0)),
        node_id: identity.node_id().clone(),
    });

    identities
        .iter()
        .enumerate()
        .map(|(index, identity)| NodeSlot {
            index,
            identity: Arc::clone(identity),
            host: ports.host.clone(),
            http_port: ports.http_port(index),
            staking_port: ports.staking_port(index),
            bootstrap: if index == 0 { None } else { seed.clone() },
            paths: SlotPaths::under(run_dir, index),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::identity::IdentityPool;

    fn pool(count: usize) -> IdentityPool {
        let pairs = (0..count).map(|i| {
            let key = rcgen::KeyPair::generate().unwrap();
            let cert = rcgen::CertificateParams::new(vec![format!("n{i}")])
                .unwrap()
                .self_signed(&key)
                .unwrap();
            (cert.pem().into_bytes(), key.serialize_pem().into_bytes())
        });
        IdentityPool::from_pem_pairs(pairs).unwrap()
    }

    #[test]
    fn exactly_one_seed_and_all_others_point_at_it() {
        for count in 2..=5 {
            let pool = pool(count);
            let slots = plan_slots(
                &pool.assign(count).unwrap(),
                &PortPlan::default(),
                Path::new("/tmp/run"),
            );

            let seeds: Vec<_> = slots.iter().filter(|slot| slot.is_seed()).collect();
            assert_eq!(seeds.len(), 1);
            assert_eq!(seeds[0].index, 0);

            for slot in &slots[1..] {
                let peer = slot.bootstrap.as_ref().unwrap();
                assert_eq!(&peer.node_id, slots[0].identity.node_id());
                assert_eq!(peer.address, slots[0].staking_address());
            }
        }
    }

    #[test]
    fn ports_interleave_http_and_staking() {
        let ports = PortPlan::default();
        assert_eq!(ports.http_port(0), 9650);
        assert_eq!(ports.staking_port(0), 9651);
        assert_eq!(ports.http_port(4), 9658);
        assert_eq!(ports.staking_port(4), 9659);
        assert_eq!(ports.last_port(5), Some(9659));
    }

    #[test]
    fn last_port_overflow_is_detected() {
        let ports = PortPlan {
            host: "127.0.0.1".into(),
            base_http_port: 65_530,
        };
        assert_eq!(ports.last_port(3), Some(65_535));
        assert_eq!(ports.last_port(4), None);
    }

    #[test]
    fn directories_are_one_based() {
        let pool = pool(2);
        let slots = plan_slots(&pool.assign(2).unwrap(), &PortPlan::default(), Path::new("/r"));
        assert_eq!(slots[1].paths.node_dir, Path::new("/r/node2"));
        assert_eq!(slots[1].paths.cert_file, Path::new("/r/node2/staker.crt"));
        assert_eq!(slots[1].paths.db_dir, Path::new("/r/node2/db"));
        assert_eq!(slots[0].http_endpoint(), "http://127.0.0.1:9650");
    }
}
