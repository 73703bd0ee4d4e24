use genmux_common::protocol::{NodeId, RequestId};
use std::time::Duration;

use crate::node::NodeStatus;

/// Lifecycle notifications published on the dispatcher's broadcast channel.
///
/// Publishing never blocks; subscribers that fall behind miss events.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    NodeRegistered { node: NodeId, name: String },
    NodeUpdated { node: NodeId },
    NodeRemoved { node: NodeId },
    NodeStatusChanged {
        node: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
    /// `position` is 1-based within the wait queue
    RequestQueued { request: RequestId, position: usize },
    RequestStarted { request: RequestId },
    AttemptFailed {
        request: RequestId,
        attempt: u32,
        error: String,
    },
    RequestCompleted {
        request: RequestId,
        served_by: NodeId,
        latency: Duration,
        attempts: u32,
    },
    RequestFailed {
        request: RequestId,
        attempts: u32,
        error: String,
    },
    ProbeSweepCompleted { active: usize, unhealthy: usize },
}
