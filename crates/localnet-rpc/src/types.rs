//! Request and response types of the node API.

use serde::{Deserialize, Deserializer, Serialize};

/// Keystore credentials the node holds keys under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPass {
    /// Keystore user name
    pub username: String,
    /// Keystore password
    pub password: String,
}

/// Identifier returned for a submitted transaction.
pub type OperationId = String;

/// Status the node reports for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Accepted into the chain
    Committed,
    /// Still being decided
    Processing,
    /// Rejected after consideration
    Aborted,
    /// Discarded before consideration
    Dropped,
    /// Not known to the node yet
    #[serde(other)]
    Unknown,
}

/// Coarse lifecycle of a submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    /// Keep polling
    Pending,
    /// Terminal success
    Committed,
    /// Terminal failure
    Failed,
}

impl TxStatus {
    /// Collapse to pending/committed/failed.
    pub fn commit_state(self) -> CommitState {
        match self {
            TxStatus::Committed => CommitState::Committed,
            TxStatus::Processing | TxStatus::Unknown => CommitState::Pending,
            TxStatus::Aborted | TxStatus::Dropped => CommitState::Failed,
        }
    }
}

/// A deployed workload as listed by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Workload (blockchain) id
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Domain (subnet) the workload runs on
    #[serde(rename = "subnetID")]
    pub domain_id: String,
    /// Declared workload kind (VM id)
    #[serde(rename = "vmID", default)]
    pub workload_kind: String,
}

/// Activation state of a deployed workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// This node validates the workload
    Validating,
    /// Created and syncing on this node
    Syncing,
    /// Created, pending acceptance
    Preferred,
    /// Created but not validated here
    Created,
    /// Not known to the node
    #[serde(other)]
    Unknown,
}

impl DeploymentStatus {
    /// True once the workload is being validated.
    pub fn is_active(self) -> bool {
        self == DeploymentStatus::Validating
    }
}

/// Transaction submission that spends from `from` and returns change to `change_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Funding {
    /// Addresses to spend from
    pub from: Vec<String>,
    /// Address receiving change
    #[serde(rename = "changeAddr")]
    pub change_address: String,
}

/// Parameters for creating a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDomainRequest {
    /// Fee source
    pub funding: Funding,
    /// Addresses that control the domain
    pub control_keys: Vec<String>,
    /// Signatures required to act on the domain
    pub threshold: u32,
}

/// Parameters for enrolling one validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollValidatorRequest {
    /// Fee source
    pub funding: Funding,
    /// Domain to validate
    pub domain_id: String,
    /// Validating node
    pub node_id: String,
    /// Sampling weight
    pub weight: u64,
    /// Unix seconds the validation starts
    pub start_time: u64,
    /// Unix seconds the validation ends
    pub end_time: u64,
}

/// Parameters for deploying a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployWorkloadRequest {
    /// Fee source
    pub funding: Funding,
    /// Domain to deploy onto
    pub domain_id: String,
    /// Declared workload kind (VM id)
    pub workload_kind: String,
    /// Feature extension ids
    pub fx_ids: Vec<String>,
    /// Human-readable name
    pub name: String,
    /// Raw genesis payload
    pub genesis: Vec<u8>,
}

/// Accept either a JSON number or a decimal string.
pub(crate) fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn tx_status_maps_to_commit_state() {
        assert_eq!(TxStatus::Committed.commit_state(), CommitState::Committed);
        assert_eq!(TxStatus::Processing.commit_state(), CommitState::Pending);
        assert_eq!(TxStatus::Unknown.commit_state(), CommitState::Pending);
        assert_eq!(TxStatus::Dropped.commit_state(), CommitState::Failed);
        assert_eq!(TxStatus::Aborted.commit_state(), CommitState::Failed);
    }

    #[test]
    fn unrecognised_status_strings_are_unknown() {
        let status: TxStatus = serde_json::from_str("\"Gossiping\"").unwrap();
        assert_eq!(status, TxStatus::Unknown);
        let status: DeploymentStatus = serde_json::from_str("\"\"").unwrap();
        assert_eq!(status, DeploymentStatus::Unknown);
        assert!(!status.is_active());
    }

    #[test]
    fn deployment_reads_node_field_names() {
        let json = r#"{"id":"abc","name":"kewl vm","subnetID":"sub","vmID":"vm"}"#;
        let deployment: Deployment = serde_json::from_str(json).unwrap();
        assert_eq!(deployment.domain_id, "sub");
        assert_eq!(deployment.workload_kind, "vm");
    }
}
