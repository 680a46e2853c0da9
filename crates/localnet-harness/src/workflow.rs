//! Provisioning workflow.
//!
//! Runs once after the network is ready, against a single reference node:
//!
//! 1. CreateAccount
//! 2. FundAccount
//! 3. CreateDomain
//! 4. AwaitDomainCommit
//! 5. EnrollValidators (submit and commit one node at a time)
//! 6. DeployWorkload
//! 7. ConfirmActivation
//!
//! A failed submission aborts the workflow. Only status polling after a
//! successful submission is retried, and every poll loop checks
//! cancellation before each query.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use localnet_core::{CancelToken, NodeId};
use localnet_rpc::{
    CommitState, ControlPlane, CreateDomainRequest, DeployWorkloadRequest, EnrollValidatorRequest,
    Funding, RpcResult, UserPass,
};
use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::errors::WorkflowError;

/// Provisioning step kinds, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepKind {
    /// Register the keystore account
    CreateAccount,
    /// Import the funded key and check its balance
    FundAccount,
    /// Submit the domain creation
    CreateDomain,
    /// Poll the domain creation to commitment
    AwaitDomainCommit,
    /// Enroll every node as a validator of the domain
    EnrollValidators,
    /// Submit the workload deployment and poll it to commitment
    DeployWorkload,
    /// Poll the deployed workload until it is active
    ConfirmActivation,
}

impl StepKind {
    /// All steps in execution order
    pub const ALL: [StepKind; 7] = [
        StepKind::CreateAccount,
        StepKind::FundAccount,
        StepKind::CreateDomain,
        StepKind::AwaitDomainCommit,
        StepKind::EnrollValidators,
        StepKind::DeployWorkload,
        StepKind::ConfirmActivation,
    ];
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal or in-flight status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Submitted, not yet accepted
    Pending,
    /// Accepted
    Committed,
    /// Rejected or terminally failed
    Failed,
}

/// Record of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningStep {
    /// Which step
    pub kind: StepKind,
    /// Reference ids produced (addresses, transaction ids, workload ids)
    pub references: Vec<String>,
    /// Current status
    pub status: StepStatus,
}

/// A validator enrollment that reached commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Enrolled node
    pub node_id: NodeId,
    /// Enrollment transaction
    pub tx_id: String,
}

/// Outcome of a completed workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningReport {
    /// Address controlled by the funded key
    pub address: String,
    /// Balance seen on that address
    pub balance: u64,
    /// Id of the created domain
    pub domain_id: String,
    /// Enrollments in submission order
    pub enrollments: Vec<Enrollment>,
    /// Id of the deployed workload
    pub workload_id: String,
    /// Every step, in execution order
    pub steps: Vec<ProvisioningStep>,
}

/// Inputs to the workflow that do not come from the network.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Keystore credentials
    pub credentials: UserPass,
    /// Pre-funded key to import
    pub funded_key: String,
    /// Declared workload kind
    pub workload_kind: String,
    /// Workload display name
    pub workload_name: String,
    /// Raw genesis payload
    pub genesis: Vec<u8>,
    /// Validator weight
    pub validator_weight: u64,
    /// Delay from enrollment to validation start
    pub start_offset: Duration,
    /// Delay from enrollment to validation end
    pub end_offset: Duration,
    /// Between transaction status polls
    pub commit_interval: Duration,
    /// Between activation polls
    pub activation_interval: Duration,
}

impl WorkflowSettings {
    /// Settings from a harness config plus the already-read genesis payload.
    pub fn from_config(config: &HarnessConfig, genesis: Vec<u8>) -> Self {
        Self {
            credentials: config.provisioning.credentials(),
            funded_key: config.provisioning.funded_key.clone(),
            workload_kind: config.workload.vm_id.clone(),
            workload_name: config.workload.name.clone(),
            genesis,
            validator_weight: config.provisioning.validator_weight,
            start_offset: Duration::from_secs(config.provisioning.start_offset_secs),
            end_offset: Duration::from_secs(config.provisioning.end_offset_secs),
            commit_interval: config.polling.commit_interval(),
            activation_interval: config.polling.activation_interval(),
        }
    }
}

/// Sequential provisioning state machine.
pub struct ProvisioningWorkflow {
    control: Arc<dyn ControlPlane>,
    validators: Vec<NodeId>,
    settings: WorkflowSettings,
    steps: Vec<ProvisioningStep>,
}

impl ProvisioningWorkflow {
    /// Workflow that enrolls `validators` through `control`.
    pub fn new(
        control: Arc<dyn ControlPlane>,
        validators: Vec<NodeId>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            control,
            validators,
            settings,
            steps: Vec::new(),
        }
    }

    /// Steps recorded so far, including a failed last step
    pub fn steps(&self) -> &[ProvisioningStep] {
        &self.steps
    }

    /// Execute every step in order.
    pub async fn run(&mut self, token: &CancelToken) -> Result<ProvisioningReport, WorkflowError> {
        let control = Arc::clone(&self.control);
        let credentials = self.settings.credentials.clone();
        let funded_key = self.settings.funded_key.clone();

        // 1. account
        self.begin(StepKind::CreateAccount, token)?;
        self.submit(StepKind::CreateAccount, control.create_user(&credentials))
            .await?;
        self.record(
            StepKind::CreateAccount,
            vec![credentials.username.clone()],
            StepStatus::Committed,
        );

        // 2. funds
        self.begin(StepKind::FundAccount, token)?;
        let address = self
            .submit(
                StepKind::FundAccount,
                control.import_key(&credentials, &funded_key),
            )
            .await?;
        let balance = self
            .submit(StepKind::FundAccount, control.get_balance(&address))
            .await?;
        if balance == 0 {
            self.record(StepKind::FundAccount, vec![address.clone()], StepStatus::Failed);
            return Err(WorkflowError::Unfunded { address });
        }
        tracing::info!(%address, balance, "funded account ready");
        self.record(StepKind::FundAccount, vec![address.clone()], StepStatus::Committed);

        let funding = Funding {
            from: vec![address.clone()],
            change_address: address.clone(),
        };

        // 3-4. domain
        self.begin(StepKind::CreateDomain, token)?;
        let request = CreateDomainRequest {
            funding: funding.clone(),
            control_keys: vec![address.clone()],
            threshold: 1,
        };
        let domain_tx = self
            .submit(
                StepKind::CreateDomain,
                control.create_domain(&credentials, &request),
            )
            .await?;
        tracing::info!(tx_id = %domain_tx, "domain creation submitted");
        self.record(StepKind::CreateDomain, vec![domain_tx.clone()], StepStatus::Pending);

        self.begin(StepKind::AwaitDomainCommit, token)?;
        self.record(
            StepKind::AwaitDomainCommit,
            vec![domain_tx.clone()],
            StepStatus::Pending,
        );
        self.await_commit(StepKind::AwaitDomainCommit, &domain_tx, token)
            .await?;
        self.mark(StepKind::CreateDomain, StepStatus::Committed);
        self.mark(StepKind::AwaitDomainCommit, StepStatus::Committed);
        let domain_id = domain_tx;

        // 5. validators
        self.begin(StepKind::EnrollValidators, token)?;
        self.record(StepKind::EnrollValidators, Vec::new(), StepStatus::Pending);
        let mut enrollments = Vec::with_capacity(self.validators.len());
        for node_id in self.validators.clone() {
            token
                .check()
                .map_err(|_| cancelled(StepKind::EnrollValidators))?;
            let (start_time, end_time) = self.validation_window();
            let request = EnrollValidatorRequest {
                funding: funding.clone(),
                domain_id: domain_id.clone(),
                node_id: node_id.to_string(),
                weight: self.settings.validator_weight,
                start_time,
                end_time,
            };
            let tx_id = self
                .submit(
                    StepKind::EnrollValidators,
                    control.enroll_validator(&credentials, &request),
                )
                .await?;
            self.push_reference(StepKind::EnrollValidators, tx_id.clone());
            tracing::info!(node_id = %node_id, %tx_id, "validator enrollment submitted");
            self.await_commit(StepKind::EnrollValidators, &tx_id, token)
                .await?;
            enrollments.push(Enrollment { node_id, tx_id });
        }
        self.mark(StepKind::EnrollValidators, StepStatus::Committed);

        // 6. workload
        self.begin(StepKind::DeployWorkload, token)?;
        let request = DeployWorkloadRequest {
            funding,
            domain_id: domain_id.clone(),
            workload_kind: self.settings.workload_kind.clone(),
            fx_ids: Vec::new(),
            name: self.settings.workload_name.clone(),
            genesis: self.settings.genesis.clone(),
        };
        let deploy_tx = self
            .submit(
                StepKind::DeployWorkload,
                control.deploy_workload(&credentials, &request),
            )
            .await?;
        self.record(
            StepKind::DeployWorkload,
            vec![deploy_tx.clone()],
            StepStatus::Pending,
        );
        tracing::info!(tx_id = %deploy_tx, "workload deployment submitted");
        self.await_commit(StepKind::DeployWorkload, &deploy_tx, token)
            .await?;
        self.mark(StepKind::DeployWorkload, StepStatus::Committed);

        // 7. activation
        self.begin(StepKind::ConfirmActivation, token)?;
        let deployments = self
            .submit(StepKind::ConfirmActivation, control.list_deployments())
            .await?;
        let Some(workload) = deployments.into_iter().find(|d| d.domain_id == domain_id) else {
            self.record(StepKind::ConfirmActivation, Vec::new(), StepStatus::Failed);
            return Err(WorkflowError::DeploymentNotFound { domain_id });
        };
        tracing::info!(workload_id = %workload.id, "workload created");
        self.record(
            StepKind::ConfirmActivation,
            vec![workload.id.clone()],
            StepStatus::Pending,
        );
        self.await_activation(&workload.id, token).await?;
        self.mark(StepKind::ConfirmActivation, StepStatus::Committed);
        tracing::info!(workload_id = %workload.id, "workload validating");

        Ok(ProvisioningReport {
            address,
            balance,
            domain_id,
            enrollments,
            workload_id: workload.id,
            steps: self.steps.clone(),
        })
    }

    /// Poll `tx_id` until it commits. Query failures count as pending.
    pub async fn await_commit(
        &mut self,
        step: StepKind,
        tx_id: &str,
        token: &CancelToken,
    ) -> Result<(), WorkflowError> {
        loop {
            token.check().map_err(|_| cancelled(step))?;
            let status = token
                .run_until_cancelled(self.control.operation_status(tx_id))
                .await
                .map_err(|_| cancelled(step))?;

            match status {
                Ok(status) => match status.commit_state() {
                    CommitState::Committed => {
                        tracing::debug!(%step, tx_id, "transaction committed");
                        return Ok(());
                    }
                    CommitState::Failed => {
                        self.mark_last(step, StepStatus::Failed);
                        return Err(WorkflowError::StepFailed {
                            step,
                            tx_id: tx_id.to_string(),
                            status,
                        });
                    }
                    CommitState::Pending => {
                        tracing::info!(
                            %step,
                            tx_id,
                            ?status,
                            "waiting for transaction to be accepted"
                        );
                    }
                },
                Err(err) => tracing::debug!(%step, tx_id, error = %err, "status query failed"),
            }

            token
                .sleep(self.settings.commit_interval)
                .await
                .map_err(|_| cancelled(step))?;
        }
    }

    /// Poll the workload until the reference node validates it.
    pub async fn await_activation(
        &mut self,
        workload_id: &str,
        token: &CancelToken,
    ) -> Result<(), WorkflowError> {
        let step = StepKind::ConfirmActivation;
        loop {
            token.check().map_err(|_| cancelled(step))?;
            let status = token
                .run_until_cancelled(self.control.deployment_status(workload_id))
                .await
                .map_err(|_| cancelled(step))?;

            match status {
                Ok(status) if status.is_active() => return Ok(()),
                Ok(status) => tracing::info!(workload_id, ?status, "waiting for validating status"),
                Err(err) => tracing::debug!(workload_id, error = %err, "status query failed"),
            }

            token
                .sleep(self.settings.activation_interval)
                .await
                .map_err(|_| cancelled(step))?;
        }
    }

    fn begin(&self, step: StepKind, token: &CancelToken) -> Result<(), WorkflowError> {
        token.check().map_err(|_| cancelled(step))?;
        tracing::debug!(%step, "starting step");
        Ok(())
    }

    async fn submit<T>(
        &mut self,
        step: StepKind,
        call: impl std::future::Future<Output = RpcResult<T>>,
    ) -> Result<T, WorkflowError> {
        match call.await {
            Ok(value) => Ok(value),
            Err(source) => {
                tracing::error!(%step, error = %source, "submission rejected");
                if !self.mark_last(step, StepStatus::Failed) {
                    self.record(step, Vec::new(), StepStatus::Failed);
                }
                Err(WorkflowError::Rejected { step, source })
            }
        }
    }

    fn record(&mut self, kind: StepKind, references: Vec<String>, status: StepStatus) {
        self.steps.push(ProvisioningStep {
            kind,
            references,
            status,
        });
    }

    fn mark(&mut self, kind: StepKind, status: StepStatus) {
        if let Some(step) = self.steps.iter_mut().rev().find(|s| s.kind == kind) {
            step.status = status;
        }
    }

    /// Mark the latest record of `kind` if it is still pending.
    fn mark_last(&mut self, kind: StepKind, status: StepStatus) -> bool {
        match self.steps.last_mut() {
            Some(step) if step.kind == kind && step.status == StepStatus::Pending => {
                step.status = status;
                true
            }
            _ => false,
        }
    }

    fn push_reference(&mut self, kind: StepKind, reference: String) {
        if let Some(step) = self.steps.iter_mut().rev().find(|s| s.kind == kind) {
            step.references.push(reference);
        }
    }

    fn validation_window(&self) -> (u64, u64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (
            (now + self.settings.start_offset).as_secs(),
            (now + self.settings.end_offset).as_secs(),
        )
    }
}

fn cancelled(step: StepKind) -> WorkflowError {
    WorkflowError::Cancelled { step: Some(step) }
}
