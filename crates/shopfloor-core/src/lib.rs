//! Shopfloor core: shared types, errors, and utilities.
//!
//! This crate provides the foundational types used across all Shopfloor
//! crates. It has no internal Shopfloor dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types, error kinds, and the Result alias
//! - [`domain`]: The fixed set of server domains and their metadata
//! - [`traits`]: Core traits for data-source abstraction
//! - [`util`]: Path utilities

pub mod domain;
pub mod error;
pub mod traits;
pub mod util;

// Re-export key types at crate root for convenience
pub use domain::ServerDomain;
pub use error::{Error, ErrorKind, Result};
pub use traits::DataSource;
