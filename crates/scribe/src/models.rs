//! These models represent the objects passed around by the bridge and the agent
//!
//! There are several different related formats we need to interact with:
//! - chat messages with parts, sent from the client to a request handler
//! - `data:` frames streamed from a request handler back to the client
//! - openai messages/tools, sent from the agent to the LLM
//! - anthropic messages/tools, sent from the agent to the LLM
//! - tool catalogs and execution requests exchanged with the hosted toolkit
//!
//! These all overlap to varying degrees. We always immediately convert those data models
//! into the internal structs using to/from helpers. Because of the need for compatibility,
//! the internal models are not an exactly match to any of these formats.
pub mod conversation;
pub mod message;
pub mod role;
pub mod tool;
