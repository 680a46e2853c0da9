//! # Localnet RPC - Layer 2: Node API Surface
//!
//! The status and control-plane operations the harness performs against a
//! running node, as object-safe async traits, plus a JSON-RPC client over
//! `reqwest` that implements them.
//!
//! ## What Does NOT Belong Here
//!
//! - Polling policy, retries, ordering of provisioning steps (localnet-harness)
//! - Test doubles of these traits (localnet-testkit)

pub mod api;
pub mod client;
pub mod encoding;
pub mod error;
pub mod jsonrpc;
pub mod types;

pub use api::{ControlPlane, InfoApi};
pub use client::{NodeClient, DEFAULT_TIMEOUT};
pub use encoding::hex_with_checksum;
pub use error::{RpcError, RpcResult};
pub use jsonrpc::JsonRpcClient;
pub use types::{
    CommitState, CreateDomainRequest, DeployWorkloadRequest, Deployment, DeploymentStatus,
    EnrollValidatorRequest, Funding, OperationId, TxStatus, UserPass,
};
