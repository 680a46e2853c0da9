//! Node identity pool.
//!
//! Identities are pre-provisioned staking certificate/key pairs. The pool is
//! loaded once at startup and handed out by reference; nothing mutates an
//! identity after it has been derived.
//!
//! A node id is `NodeID-` followed by the CB58 encoding of
//! `RIPEMD-160(SHA-256(certificate DER))`. CB58 is base58 over the payload
//! with the last four bytes of its SHA-256 appended.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{IdentityError, SetupError};

/// Prefix the node runtime prints in front of short ids.
pub const NODE_ID_PREFIX: &str = "NodeID-";

/// File name of the staking certificate inside a pool slot and a node directory.
pub const CERT_FILE_NAME: &str = "staker.crt";

/// File name of the staking key inside a pool slot and a node directory.
pub const KEY_FILE_NAME: &str = "staker.key";

/// Stable, printable node identifier derived from a staking certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Get the prefixed id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One loaded identity: certificate, key and the id derived from them.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    index: usize,
    node_id: NodeId,
    certificate: Vec<u8>,
    private_key: Vec<u8>,
}

impl NodeIdentity {
    /// Parse a certificate/key pair and derive its node id.
    pub fn from_pem(
        index: usize,
        certificate: Vec<u8>,
        private_key: Vec<u8>,
    ) -> Result<Self, IdentityError> {
        let node_id = derive_node_id(index, &certificate)?;
        check_private_key(index, &private_key)?;
        Ok(Self {
            index,
            node_id,
            certificate,
            private_key,
        })
    }

    /// Position in the pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// Derived node id
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Raw PEM certificate bytes
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Raw PEM private key bytes
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

// Key material stays out of logs.
impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("index", &self.index)
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

/// Ordered set of distinct identities, one per potential node slot.
#[derive(Debug, Clone, Default)]
pub struct IdentityPool {
    identities: Vec<Arc<NodeIdentity>>,
}

impl IdentityPool {
    /// Build a pool from in-memory `(certificate, key)` PEM pairs.
    ///
    /// Fails on the first malformed pair and on any repeated certificate.
    pub fn from_pem_pairs<I>(pairs: I) -> Result<Self, IdentityError>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let mut identities = Vec::new();
        let mut seen: HashMap<NodeId, usize> = HashMap::new();

        for (index, (certificate, private_key)) in pairs.into_iter().enumerate() {
            let identity = NodeIdentity::from_pem(index, certificate, private_key)?;
            if let Some(first) = seen.insert(identity.node_id.clone(), index) {
                return Err(IdentityError::DuplicateIdentity {
                    first,
                    second: index,
                    node_id: identity.node_id.to_string(),
                });
            }
            identities.push(Arc::new(identity));
        }

        Ok(Self { identities })
    }

    /// Load `keys1/`, `keys2/`, ... from `dir` until the next slot is absent.
    pub fn load_dir(dir: &Path) -> Result<Self, SetupError> {
        if !dir.is_dir() {
            return Err(SetupError::MissingInput {
                what: "identity pool directory",
                path: dir.to_path_buf(),
            });
        }

        let mut pairs = Vec::new();
        for slot in 1.. {
            let slot_dir = dir.join(format!("keys{slot}"));
            if !slot_dir.is_dir() {
                break;
            }
            let cert_path = slot_dir.join(CERT_FILE_NAME);
            let key_path = slot_dir.join(KEY_FILE_NAME);
            let certificate = std::fs::read(&cert_path)
                .map_err(|e| SetupError::io("read certificate", &cert_path, e))?;
            let private_key = std::fs::read(&key_path)
                .map_err(|e| SetupError::io("read staking key", &key_path, e))?;
            pairs.push((certificate, private_key));
        }

        let pool = Self::from_pem_pairs(pairs)?;
        tracing::debug!(dir = %dir.display(), identities = pool.len(), "loaded identity pool");
        Ok(pool)
    }

    /// Number of identities in the pool
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// True when the pool holds no identities
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// All identities in pool order
    pub fn identities(&self) -> &[Arc<NodeIdentity>] {
        &self.identities
    }

    /// Assign the first `count` identities to node slots `0..count`.
    pub fn assign(&self, count: usize) -> Result<Vec<Arc<NodeIdentity>>, IdentityError> {
        if count > self.identities.len() {
            return Err(IdentityError::PoolTooSmall {
                available: self.identities.len(),
                requested: count,
            });
        }
        Ok(self.identities[..count].to_vec())
    }

    /// Node ids of the whole pool, in order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.identities
            .iter()
            .map(|identity| identity.node_id.clone())
            .collect()
    }
}

/// Derive the node id for a PEM certificate.
pub fn derive_node_id(index: usize, certificate_pem: &[u8]) -> Result<NodeId, IdentityError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(certificate_pem).map_err(|e| {
        IdentityError::MalformedPem {
            index,
            reason: e.to_string(),
        }
    })?;
    if pem.label != "CERTIFICATE" {
        return Err(IdentityError::MalformedPem {
            index,
            reason: format!("expected CERTIFICATE block, found {}", pem.label),
        });
    }

    x509_parser::parse_x509_certificate(&pem.contents).map_err(|e| {
        IdentityError::MalformedCertificate {
            index,
            reason: e.to_string(),
        }
    })?;

    let short_id = Ripemd160::digest(Sha256::digest(&pem.contents));
    Ok(NodeId(format!("{NODE_ID_PREFIX}{}", cb58_encode(&short_id))))
}

/// Base58 with a 4-byte SHA-256 checksum suffix.
pub fn cb58_encode(payload: &[u8]) -> String {
    let checksum = Sha256::digest(payload);
    let mut buf = Vec::with_capacity(payload.len() + 4);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum[checksum.len() - 4..]);
    bs58::encode(buf).into_string()
}

fn check_private_key(index: usize, private_key: &[u8]) -> Result<(), IdentityError> {
    match x509_parser::pem::parse_x509_pem(private_key) {
        Ok((_, pem)) if pem.label.ends_with("PRIVATE KEY") => Ok(()),
        _ => Err(IdentityError::MalformedKey { index }),
    }
}
