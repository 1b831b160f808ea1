//! Shopfloor tool servers.
//!
//! A [`ServerInstance`] binds one domain's tool registry to one transport:
//! HTTP ([`http`]) or newline-delimited stdio ([`stdio`]). Both transports
//! decode the same [`ToolCall`] frame and emit the same envelope encoding,
//! so a call answers with identical bytes on either channel.

pub mod http;
pub mod instance;
pub mod request;
pub mod stdio;

pub use instance::{Health, ServerInfo, ServerInstance, TransportMode, parse_host};
pub use request::{ToolCall, parse_request};
