//! # Localnet Harness - Layer 3: Orchestration
//!
//! Stands up a local multi-process network and provisions it:
//!
//! - **Supervisor**: one child process per slot, stopped on cancellation
//! - **Monitor**: fan-out status polling until every node is bootstrapped and peered
//! - **Workflow**: account, funding, domain, validators, workload, activation
//! - **Network**: wires the above into one first-error-wins task group
//!
//! Configuration comes from [`HarnessConfig`]; everything talks to nodes
//! through the `localnet-rpc` traits so fakes can stand in for real nodes.

pub mod config;
pub mod errors;
pub mod monitor;
pub mod network;
pub mod signal;
pub mod supervisor;
pub mod workflow;
pub mod workspace;

pub use config::HarnessConfig;
pub use errors::{HarnessError, Result, WorkflowError};
pub use monitor::{BootstrapMonitor, NodeProgress};
pub use network::{ApiFactory, HttpApiFactory, LocalNetwork, NodeEndpoint, RunReport};
pub use signal::{cancel_on_signal, shutdown_signal};
pub use supervisor::{supervise, NodeCommand, NodeHandle};
pub use workflow::{
    Enrollment, ProvisioningReport, ProvisioningStep, ProvisioningWorkflow, StepKind, StepStatus,
    WorkflowSettings,
};
pub use workspace::RunDirectory;
