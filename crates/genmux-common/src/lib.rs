//! Genmux Common Types
//!
//! This crate provides the protocol definitions shared by every genmux
//! component: the backend-agnostic generation payload, the result a caller
//! receives once a request completes, and the dispatcher's error taxonomy.
//!
//! # Components
//!
//! - [`protocol`] - Request, completion and error types
//!
//! # Example
//!
//! ```
//! use genmux_common::{GenerationRequest, Role};
//!
//! let request = GenerationRequest::user("Summarise this resume")
//!     .with_system("You are a concise recruiter")
//!     .with_max_tokens(256);
//!
//! assert_eq!(request.messages[0].role, Role::System);
//! assert_eq!(request.token_budget(128), 128);
//! ```

pub mod protocol;

pub use protocol::*;
