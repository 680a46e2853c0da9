//! The two API surfaces the harness needs from a node.
//!
//! `InfoApi` answers bootstrap questions and is polled on every node.
//! `ControlPlane` submits and inspects provisioning operations and is only
//! used against the reference node. Both are object-safe so the harness can
//! run against fakes.

use async_trait::async_trait;

use crate::error::RpcResult;
use crate::types::{
    CreateDomainRequest, DeployWorkloadRequest, Deployment, DeploymentStatus,
    EnrollValidatorRequest, OperationId, TxStatus, UserPass,
};

/// Per-node status queries.
#[async_trait]
pub trait InfoApi: Send + Sync {
    /// Whether the node finished bootstrapping the named partition (`P`, `C`, `X`).
    async fn is_bootstrapped(&self, partition: &str) -> RpcResult<bool>;

    /// Number of peers the node is connected to.
    async fn peer_count(&self) -> RpcResult<usize>;

    /// Node id the process reports for itself.
    async fn node_id(&self) -> RpcResult<String>;
}

/// Provisioning operations against one node.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a keystore account.
    async fn create_user(&self, credentials: &UserPass) -> RpcResult<()>;

    /// Import a private key into the account; returns the controlled address.
    async fn import_key(&self, credentials: &UserPass, private_key: &str) -> RpcResult<String>;

    /// Spendable balance of an address.
    async fn get_balance(&self, address: &str) -> RpcResult<u64>;

    /// Submit a domain creation; the returned id is also the new domain's id.
    async fn create_domain(
        &self,
        credentials: &UserPass,
        request: &CreateDomainRequest,
    ) -> RpcResult<OperationId>;

    /// Status of a previously submitted operation.
    async fn operation_status(&self, operation: &str) -> RpcResult<TxStatus>;

    /// Enroll one node as a validator of a domain.
    async fn enroll_validator(
        &self,
        credentials: &UserPass,
        request: &EnrollValidatorRequest,
    ) -> RpcResult<OperationId>;

    /// Deploy a workload onto a domain.
    async fn deploy_workload(
        &self,
        credentials: &UserPass,
        request: &DeployWorkloadRequest,
    ) -> RpcResult<OperationId>;

    /// Every deployed workload the node knows about.
    async fn list_deployments(&self) -> RpcResult<Vec<Deployment>>;

    /// Activation state of one workload.
    async fn deployment_status(&self, workload_id: &str) -> RpcResult<DeploymentStatus>;
}
