//! Localnet Testing Infrastructure
//!
//! Fakes for the node API traits and generated identity fixtures, shared by
//! the harness unit tests and scenario tests.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! localnet-testkit = { path = "../localnet-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod control_plane;
pub mod identity;
pub mod status;

pub use control_plane::{ControlCall, RecordingControlPlane, DOMAIN_TX, FUNDED_ADDRESS, WORKLOAD_TX};
pub use identity::IdentityFixture;
pub use status::ScriptedNodeStatus;
