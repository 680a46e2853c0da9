//! # Localnet Core - Layer 1: Identities and Run Coordination
//!
//! Foundation types shared by every localnet crate.
//!
//! ## Purpose
//!
//! - Identity pool: staking certificate/key pairs and the node ids derived from them
//! - Slot topology: per-node ports, directories and bootstrap reference
//! - Node flags: the complete flag table handed to each node process
//! - Run coordination: cancellation signal, write-once readiness signal,
//!   and a first-error-wins task group
//!
//! ## What Does NOT Belong Here
//!
//! - Talking to nodes over the network (localnet-rpc)
//! - Spawning processes or driving provisioning (localnet-harness)
//! - Fakes and fixtures (localnet-testkit)

pub mod cancel;
pub mod errors;
pub mod flags;
pub mod identity;
pub mod readiness;
pub mod task_group;
pub mod topology;

pub use cancel::{CancelToken, CancellationSource, Cancelled};
pub use errors::{IdentityError, SetupError};
pub use flags::{NodeFlags, SharedNodeSettings};
pub use identity::{derive_node_id, IdentityPool, NodeId, NodeIdentity, NODE_ID_PREFIX};
pub use readiness::{
    readiness_signal, NetworkReady, ReadinessError, ReadinessSender, ReadinessWatch,
};
pub use task_group::{CancellationAware, TaskGroup, TaskPanic};
pub use topology::{plan_slots, BootstrapPeer, NodeSlot, PortPlan, SlotPaths};
