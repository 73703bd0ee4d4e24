//! Dispatcher Result Types
//!
//! This module defines what a caller eventually receives from a completion
//! handle.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::DispatchError;
use super::node_id::NodeId;
use super::requests::RequestId;

/// Successful resolution of a submitted generation request.
///
/// # Fields
///
/// - `request_id`: Identifier assigned at submission
/// - `text`: Generated text returned by the backend
/// - `served_by`: Node that produced the text
/// - `node_name`: Human-readable name of that node at dispatch time
/// - `latency`: Wall time of the successful attempt (excludes queueing and retry delays)
/// - `attempts`: Number of attempts made, including the successful one
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub request_id: RequestId,
    pub text: String,
    pub served_by: NodeId,
    pub node_name: String,
    pub latency: Duration,
    pub attempts: u32,
}

impl Completion {
    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis() as u64
    }
}

/// Serializable view of a rejected request.
///
/// # Example
///
/// ```
/// use genmux_common::protocol::{DispatchError, Rejection};
///
/// let error = DispatchError::RetryExhausted {
///     attempts: 3,
///     last_error: Box::new(DispatchError::NoAvailableNode),
/// };
/// let rejection = Rejection::from_error(&error);
/// assert_eq!(rejection.attempts, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rejection {
    pub error: String,
    pub attempts: u32,
}

impl Rejection {
    pub fn from_error(error: &DispatchError) -> Self {
        match error {
            DispatchError::RetryExhausted {
                attempts,
                last_error,
            } => Rejection {
                error: last_error.to_string(),
                attempts: *attempts,
            },
            other => Rejection {
                error: other.to_string(),
                attempts: 0,
            },
        }
    }
}
