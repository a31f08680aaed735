//! These models represent the objects passed between the agent, the gateway and the console
//!
//! There are two related formats we need to interact with:
//! - the conversation messages the agent streams out, tagged by `role`
//! - openai messages/tools, sent from the agent to the routing gateway
//!
//! The internal models follow the first format; the providers convert to and from the
//! second with the helpers in `providers::utils`.
pub mod chunk;
pub mod message;
pub mod tool;
