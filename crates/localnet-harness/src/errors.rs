//! Run-level error types.
//!
//! `HarnessError` is what a run reports: the first fatal cause, or
//! `Cancelled` when the run was stopped from outside.

use std::process::ExitStatus;

use localnet_core::{CancellationAware, Cancelled, ReadinessError, SetupError, TaskPanic};
use localnet_rpc::{RpcError, TxStatus};
use thiserror::Error;

use crate::workflow::StepKind;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Failures of the provisioning workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A submission call itself failed
    #[error("{step} rejected: {source}")]
    Rejected {
        /// Step whose call failed
        step: StepKind,
        /// Remote or transport failure
        #[source]
        source: RpcError,
    },

    /// A submitted transaction reached a terminal failure status
    #[error("{step}: transaction {tx_id} ended as {status:?}")]
    StepFailed {
        /// Step that submitted the transaction
        step: StepKind,
        /// Transaction id
        tx_id: String,
        /// Terminal status reported
        status: TxStatus,
    },

    /// The imported key controls no funds
    #[error("funded address {address} reports a zero balance")]
    Unfunded {
        /// Address returned by the key import
        address: String,
    },

    /// No deployed workload belongs to the new domain
    #[error("no workload deployed on domain {domain_id}")]
    DeploymentNotFound {
        /// Domain that was searched
        domain_id: String,
    },

    /// Readiness was never signalled
    #[error("network readiness unavailable: {0}")]
    Readiness(ReadinessError),

    /// Cancellation observed while a step was in flight
    #[error("provisioning cancelled{}", during(.step))]
    Cancelled {
        /// Step in progress, `None` if still waiting for readiness
        step: Option<StepKind>,
    },
}

fn during(step: &Option<StepKind>) -> String {
    step.map(|step| format!(" during {step}")).unwrap_or_default()
}

impl WorkflowError {
    /// Whether this only reports cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowError::Cancelled { .. })
    }

    /// Step that caused the error, if any
    pub fn step(&self) -> Option<StepKind> {
        match self {
            WorkflowError::Rejected { step, .. } | WorkflowError::StepFailed { step, .. } => {
                Some(*step)
            }
            WorkflowError::Unfunded { .. } => Some(StepKind::FundAccount),
            WorkflowError::DeploymentNotFound { .. } => Some(StepKind::ConfirmActivation),
            WorkflowError::Cancelled { step } => *step,
            WorkflowError::Readiness(_) => None,
        }
    }
}

impl From<ReadinessError> for WorkflowError {
    fn from(err: ReadinessError) -> Self {
        match err {
            ReadinessError::Cancelled => WorkflowError::Cancelled { step: None },
            other => WorkflowError::Readiness(other),
        }
    }
}

/// Errors a run can end with.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid input detected before any process started
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),

    /// A node process could not be started
    #[error("node {node}: failed to start {program}: {source}")]
    Spawn {
        /// Slot index
        node: usize,
        /// Program that was executed
        program: String,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// A node exited while the run was not shutting down
    #[error("node {node} exited unexpectedly ({status})")]
    Supervision {
        /// Slot index
        node: usize,
        /// Exit status as reported by the OS
        status: ExitStatus,
    },

    /// Waiting on a node process failed
    #[error("node {node}: lost track of process: {source}")]
    ProcessWait {
        /// Slot index
        node: usize,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// An API client could not be built
    #[error("client setup failed: {0}")]
    Client(#[from] RpcError),

    /// Provisioning failed
    #[error("provisioning failed: {0}")]
    Workflow(#[from] WorkflowError),

    /// A run task panicked
    #[error(transparent)]
    Panic(#[from] TaskPanic),

    /// The run was stopped from outside
    #[error("run cancelled")]
    Cancelled,
}

impl HarnessError {
    /// True when the error only reports cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            HarnessError::Cancelled => true,
            HarnessError::Workflow(err) => err.is_cancelled(),
            _ => false,
        }
    }
}

impl From<Cancelled> for HarnessError {
    fn from(_: Cancelled) -> Self {
        HarnessError::Cancelled
    }
}

impl CancellationAware for HarnessError {
    fn is_cancellation(&self) -> bool {
        self.is_cancelled()
    }
}
