//! Cached JSON document store for Shopfloor.
//!
//! Each server domain reads one or more JSON documents from a data
//! directory. [`DataStore`] loads and caches those documents, answers
//! identifier lookups and filtered queries, and persists mutations
//! atomically.
//!
//! # Modules
//!
//! - [`document`]: Document kinds, collection descriptors, tree helpers
//! - [`cache`]: The in-memory document cache
//! - [`store`]: The [`DataStore`] adapter
//! - [`integrity`]: Cross-document reference checks
//! - `fixtures`: Sample documents (feature `test-utils`)

pub mod cache;
pub mod document;
pub mod integrity;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use cache::DocumentCache;
pub use document::{Collection, DocumentKind};
pub use integrity::{IntegrityIssue, IntegrityReport, check_references};
pub use store::{DataStore, Lookup, NotFound};
