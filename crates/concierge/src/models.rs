//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - chat messages, sent from the client to the server (see [`crate::protocol`])
//! - data-stream protocol events, sent from the server to the client
//! - gemini contents/function declarations, sent from the agent to the LLM
//! - capability calls, sent from the agent to the tools it may use
//!
//! We always immediately convert those data models into the internal structs
//! defined here. Because of the need for compatibility, the internal models are
//! not an exact match to any of these formats.
pub mod message;
pub mod role;
pub mod tool;
