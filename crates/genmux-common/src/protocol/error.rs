use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Node timed out after {0}ms")]
    NodeTimeout(u64),

    #[error("Node API error (status {status}): {body}")]
    NodeApi { status: u16, body: String },

    #[error("No available node")]
    NoAvailableNode,

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<DispatchError>,
    },

    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request cancelled before completion")]
    Cancelled,
}

impl DispatchError {
    /// Whether this error is a per-attempt failure the retry loop absorbs.
    ///
    /// Configuration errors (`UnknownNodeKind`, `InvalidConfig`) are fatal to
    /// the call that produced them and must never be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::NodeTimeout(_)
                | DispatchError::NodeApi { .. }
                | DispatchError::NoAvailableNode
                | DispatchError::Transport(_)
        )
    }

    /// Number of attempts carried by a `RetryExhausted` rejection.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            DispatchError::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// The underlying cause of a `RetryExhausted` rejection.
    pub fn last_error(&self) -> Option<&DispatchError> {
        match self {
            DispatchError::RetryExhausted { last_error, .. } => Some(&**last_error),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
