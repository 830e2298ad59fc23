use thiserror::Error;

/// Errors that can occur during RPC operations
///
/// A call surfaces exactly one outcome: a result, [`RpcError::Cancelled`], or
/// one of the other variants. Cancellation and connection failure are kept
/// distinct so callers can tell a honored interrupt from a broken link.
#[derive(Error, Debug)]
pub enum RpcError {
    /// The server rejected the operands (malformed payload or overflow)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server observed a cancellation request and abandoned the call
    #[error("call cancelled")]
    Cancelled,

    /// Transport broken, server unreachable, or server shut down mid-call
    #[error("connection error: {0}")]
    Connection(String),

    /// Local request timeout expired before a response arrived
    #[error("request timed out")]
    Timeout,

    /// A local wait was interrupted before it elapsed
    #[error("interrupted")]
    Interrupted,

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response envelope was missing required metadata
    #[error("invalid response format")]
    InvalidResponse,

    /// A call state transition that the state machine does not allow
    #[error("invalid call state transition: {0}")]
    InvalidState(String),

    /// Required configuration was not provided
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Configuration options contradict each other
    #[error("conflicting configuration: {0}")]
    ConfigConflict(String),

    /// Operation is not valid for the transport's mode
    #[error("invalid mode: {0}")]
    InvalidMode(String),

    /// Local async runtime could not be started
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
