//! Recording control plane.
//!
//! Answers every provisioning call from an in-memory script and records the
//! order in which calls arrived, so tests can assert step sequencing.

use async_trait::async_trait;
use localnet_rpc::{
    ControlPlane, CreateDomainRequest, DeployWorkloadRequest, Deployment, DeploymentStatus,
    EnrollValidatorRequest, OperationId, RpcError, RpcResult, TxStatus, UserPass,
};
use parking_lot::Mutex;

/// One call received by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCall {
    /// `create_user`
    CreateUser,
    /// `import_key`
    ImportKey,
    /// `get_balance`
    GetBalance,
    /// `create_domain`
    CreateDomain,
    /// `operation_status` for the given id
    OperationStatus(String),
    /// `enroll_validator` for the given node id
    EnrollValidator(String),
    /// `deploy_workload` onto the given domain
    DeployWorkload(String),
    /// `list_deployments`
    ListDeployments,
    /// `deployment_status` for the given workload id
    DeploymentStatus(String),
}

impl ControlCall {
    /// Trait method name of the call
    pub fn method(&self) -> &'static str {
        match self {
            ControlCall::CreateUser => "create_user",
            ControlCall::ImportKey => "import_key",
            ControlCall::GetBalance => "get_balance",
            ControlCall::CreateDomain => "create_domain",
            ControlCall::OperationStatus(_) => "operation_status",
            ControlCall::EnrollValidator(_) => "enroll_validator",
            ControlCall::DeployWorkload(_) => "deploy_workload",
            ControlCall::ListDeployments => "list_deployments",
            ControlCall::DeploymentStatus(_) => "deployment_status",
        }
    }
}

/// Address the fake hands out for the imported key.
pub const FUNDED_ADDRESS: &str = "P-local18jma8ppw3nhx5r4ap8clazz0dps7rv5u00z96u";
/// Id of the domain-creation transaction, and therefore of the domain.
pub const DOMAIN_TX: &str = "domain-tx";
/// Id of the workload-deployment transaction, and therefore of the workload.
pub const WORKLOAD_TX: &str = "workload-tx";

#[derive(Debug)]
struct Script {
    balance: u64,
    commit_after: Option<u32>,
    failing_tx: Option<String>,
    activate_after: Option<u32>,
    reject: Option<&'static str>,
    list_foreign_only: bool,
}

/// Fake `ControlPlane` that records call order.
#[derive(Debug)]
pub struct RecordingControlPlane {
    script: Script,
    calls: Mutex<Vec<ControlCall>>,
    enrollments: Mutex<u32>,
}

impl Default for RecordingControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingControlPlane {
    /// Everything succeeds; transactions commit and the workload activates on the first poll.
    pub fn new() -> Self {
        Self {
            script: Script {
                balance: 30_000_000_000_000_000,
                commit_after: Some(1),
                failing_tx: None,
                activate_after: Some(1),
                reject: None,
                list_foreign_only: false,
            },
            calls: Mutex::new(Vec::new()),
            enrollments: Mutex::new(0),
        }
    }

    /// Reject the named trait method with a remote error.
    #[must_use]
    pub fn rejecting(mut self, method: &'static str) -> Self {
        self.script.reject = Some(method);
        self
    }

    /// Report the given balance for every address.
    #[must_use]
    pub fn with_balance(mut self, balance: u64) -> Self {
        self.script.balance = balance;
        self
    }

    /// Commit on the `polls`-th status query of each transaction; `None` never commits.
    #[must_use]
    pub fn commit_after(mut self, polls: Option<u32>) -> Self {
        self.script.commit_after = polls;
        self
    }

    /// Report `Dropped` for the given transaction id.
    #[must_use]
    pub fn dropping(mut self, tx_id: impl Into<String>) -> Self {
        self.script.failing_tx = Some(tx_id.into());
        self
    }

    /// Activate on the `polls`-th status query; `None` never activates.
    #[must_use]
    pub fn activate_after(mut self, polls: Option<u32>) -> Self {
        self.script.activate_after = polls;
        self
    }

    /// List only a workload on some other domain.
    #[must_use]
    pub fn without_matching_deployment(mut self) -> Self {
        self.script.list_foreign_only = true;
        self
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<ControlCall> {
        self.calls.lock().clone()
    }

    /// Method names of calls received so far, excluding status polls
    pub fn submissions(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .iter()
            .filter(|call| {
                !matches!(
                    call,
                    ControlCall::OperationStatus(_) | ControlCall::DeploymentStatus(_)
                )
            })
            .map(ControlCall::method)
            .collect()
    }

    /// Transaction id the fake issues for the `n`-th enrollment (0-based)
    pub fn enrollment_tx(n: u32) -> String {
        format!("validator-tx-{n}")
    }

    fn record(&self, call: ControlCall) -> RpcResult<()> {
        let method = call.method();
        self.calls.lock().push(call);

        if self.script.reject == Some(method) {
            return Err(RpcError::Remote {
                method: method.to_string(),
                code: -32000,
                message: format!("{method} rejected by script"),
            });
        }
        Ok(())
    }

    fn count_of(&self, call: &ControlCall) -> u32 {
        let count = self.calls.lock().iter().filter(|c| *c == call).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

fn reached(count: u32, threshold: Option<u32>) -> bool {
    threshold.is_some_and(|threshold| count >= threshold)
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn create_user(&self, _credentials: &UserPass) -> RpcResult<()> {
        self.record(ControlCall::CreateUser)
    }

    async fn import_key(&self, _credentials: &UserPass, _private_key: &str) -> RpcResult<String> {
        self.record(ControlCall::ImportKey)?;
        Ok(FUNDED_ADDRESS.to_string())
    }

    async fn get_balance(&self, _address: &str) -> RpcResult<u64> {
        self.record(ControlCall::GetBalance)?;
        Ok(self.script.balance)
    }

    async fn create_domain(
        &self,
        _credentials: &UserPass,
        _request: &CreateDomainRequest,
    ) -> RpcResult<OperationId> {
        self.record(ControlCall::CreateDomain)?;
        Ok(DOMAIN_TX.to_string())
    }

    async fn operation_status(&self, operation: &str) -> RpcResult<TxStatus> {
        let call = ControlCall::OperationStatus(operation.to_string());
        self.record(call.clone())?;
        if self.script.failing_tx.as_deref() == Some(operation) {
            return Ok(TxStatus::Dropped);
        }
        if reached(self.count_of(&call), self.script.commit_after) {
            Ok(TxStatus::Committed)
        } else {
            Ok(TxStatus::Processing)
        }
    }

    async fn enroll_validator(
        &self,
        _credentials: &UserPass,
        request: &EnrollValidatorRequest,
    ) -> RpcResult<OperationId> {
        self.record(ControlCall::EnrollValidator(request.node_id.clone()))?;
        let mut enrollments = self.enrollments.lock();
        let tx = Self::enrollment_tx(*enrollments);
        *enrollments += 1;
        Ok(tx)
    }

    async fn deploy_workload(
        &self,
        _credentials: &UserPass,
        request: &DeployWorkloadRequest,
    ) -> RpcResult<OperationId> {
        self.record(ControlCall::DeployWorkload(request.domain_id.clone()))?;
        Ok(WORKLOAD_TX.to_string())
    }

    async fn list_deployments(&self) -> RpcResult<Vec<Deployment>> {
        self.record(ControlCall::ListDeployments)?;
        let mut deployments = vec![Deployment {
            id: "primary-chain".to_string(),
            name: "C-Chain".to_string(),
            domain_id: "primary".to_string(),
            workload_kind: "evm".to_string(),
        }];
        if !self.script.list_foreign_only {
            deployments.push(Deployment {
                id: WORKLOAD_TX.to_string(),
                name: "kewl vm".to_string(),
                domain_id: DOMAIN_TX.to_string(),
                workload_kind: "scripted".to_string(),
            });
        }
        Ok(deployments)
    }

    async fn deployment_status(&self, workload_id: &str) -> RpcResult<DeploymentStatus> {
        let call = ControlCall::DeploymentStatus(workload_id.to_string());
        self.record(call.clone())?;
        if reached(self.count_of(&call), self.script.activate_after) {
            Ok(DeploymentStatus::Validating)
        } else {
            Ok(DeploymentStatus::Created)
        }
    }
}
