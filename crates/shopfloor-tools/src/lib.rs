//! Tool registry and per-domain tool catalogs for Shopfloor.
//!
//! Every tool result, success or failure, is returned as an [`Envelope`].
//! Transports only ever see envelopes; a handler error or panic never
//! escapes a [`ToolRegistry::invoke`] call.
//!
//! # Modules
//!
//! - [`envelope`]: The success/failure result contract
//! - [`schema`]: Parameter tables, JSON schema, structural validation
//! - [`registry`]: Tool descriptors and the per-server registry
//! - [`catalog`]: The tool tables of the five server domains

pub mod catalog;
pub mod envelope;
pub mod registry;
pub mod schema;

pub use catalog::{primary_document, registry};
pub use envelope::{Envelope, ToolFailure};
pub use registry::{ToolDescriptor, ToolRegistry, ToolRegistryBuilder};
pub use schema::{ParamKind, ParamSpec};
