//! Setup-time error types.
//!
//! Everything in this module is fatal: these errors surface before any
//! node process has been spawned and abort the run.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading or deriving node identities.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Certificate bytes are not a PEM block
    #[error("slot {index}: certificate is not valid PEM: {reason}")]
    MalformedPem {
        /// Pool slot the certificate belongs to
        index: usize,
        /// Parser message
        reason: String,
    },

    /// PEM decoded but the DER payload is not an X.509 certificate
    #[error("slot {index}: problem parsing staking certificate: {reason}")]
    MalformedCertificate {
        /// Pool slot the certificate belongs to
        index: usize,
        /// Parser message
        reason: String,
    },

    /// Key bytes are not a PEM private key
    #[error("slot {index}: staking key is not a PEM private key")]
    MalformedKey {
        /// Pool slot the key belongs to
        index: usize,
    },

    /// Two slots resolve to the same node id
    #[error("slots {first} and {second} share node id {node_id}")]
    DuplicateIdentity {
        /// Earlier slot holding the id
        first: usize,
        /// Later slot that repeats it
        second: usize,
        /// The shared id
        node_id: String,
    },

    /// Fewer identities are available than nodes requested
    #[error("identity pool holds {available} identities but {requested} nodes were requested")]
    PoolTooSmall {
        /// Identities in the pool
        available: usize,
        /// Nodes asked for
        requested: usize,
    },
}

/// Fatal problems detected before any process starts.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Identity pool could not be built
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A required input file or directory is absent
    #[error("{what} does not exist: {}", path.display())]
    MissingInput {
        /// Human label for the input ("vm binary", "genesis file", ...)
        what: &'static str,
        /// Path that was checked
        path: PathBuf,
    },

    /// Filesystem operation on the run directory failed
    #[error("{action} {}: {source}", path.display())]
    Io {
        /// What was being attempted
        action: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration values contradict each other
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SetupError {
    /// Wrap an I/O error with the action and path it occurred on.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
