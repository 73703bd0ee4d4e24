pub mod error;
pub mod node_id;
pub mod requests;
pub mod responses;


pub use error::{DispatchError, Result};
pub use node_id::NodeId;
pub use requests::{generate_request_id, ChatMessage, GenerationRequest, RequestId, Role};
pub use responses::{Completion, Rejection};
