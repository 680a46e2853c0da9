//! Errors from talking to a node's HTTP API.

use thiserror::Error;

/// Result alias for API calls
pub type RpcResult<T> = Result<T, RpcError>;

/// Failures of a single remote call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Base URL is unusable
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// Connection, timeout or other transport failure
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        /// URL that was called
        endpoint: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status without a JSON-RPC error body
    #[error("{endpoint} answered HTTP {status}: {body}")]
    Http {
        /// URL that was called
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The node answered with a JSON-RPC error object
    #[error("{method} rejected (code {code}): {message}")]
    Remote {
        /// JSON-RPC method
        method: String,
        /// JSON-RPC error code
        code: i64,
        /// Error message from the node
        message: String,
    },

    /// The response did not match the expected shape
    #[error("could not decode {method} response: {reason}")]
    Decode {
        /// JSON-RPC method
        method: String,
        /// What went wrong
        reason: String,
    },

    /// The call succeeded but the node reported a negative outcome
    #[error("{method} reported failure: {reason}")]
    Unsuccessful {
        /// JSON-RPC method
        method: String,
        /// Reason given
        reason: String,
    },
}

impl RpcError {
    /// True for failures that say nothing about the remote state (unreachable node, timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transport { .. } | RpcError::Http { .. })
    }
}
