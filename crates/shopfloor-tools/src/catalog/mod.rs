//! Per-domain tool catalogs.
//!
//! Each submodule exposes `tools()`, the static descriptor table for one
//! server domain. [`registry`] assembles the table for a domain into a
//! [`ToolRegistry`].

pub mod business;
pub mod maintenance;
pub mod procedures;
pub mod production;
pub mod workforce;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use shopfloor_core::{Result, ServerDomain};
use shopfloor_store::{DataStore, DocumentKind};

use crate::registry::{ToolDescriptor, ToolRegistry};

/// Descriptor table for a domain.
pub fn tools(domain: ServerDomain) -> Vec<ToolDescriptor> {
    match domain {
        ServerDomain::Maintenance => maintenance::tools(),
        ServerDomain::Business => business::tools(),
        ServerDomain::Production => production::tools(),
        ServerDomain::Workforce => workforce::tools(),
        ServerDomain::Procedures => procedures::tools(),
    }
}

/// Build the registry for a domain over `store`.
///
/// # Errors
///
/// Fails if the domain's table contains a duplicate tool name.
pub fn registry(domain: ServerDomain, store: Arc<DataStore>) -> Result<ToolRegistry> {
    Ok(ToolRegistry::builder(domain, store)
        .register_all(tools(domain))?
        .build())
}

/// The document whose availability decides a domain server's health.
pub fn primary_document(domain: ServerDomain) -> DocumentKind {
    match domain {
        ServerDomain::Maintenance => DocumentKind::Maintenance,
        ServerDomain::Business => DocumentKind::Business,
        ServerDomain::Production => DocumentKind::Production,
        ServerDomain::Workforce => DocumentKind::Workforce,
        ServerDomain::Procedures => DocumentKind::Procedures,
    }
}

// ---------------------------------------------------------------------------
// Shared handler helpers
// ---------------------------------------------------------------------------

/// Whether `entity[field]` equals `filter`, or `filter` is absent.
pub(crate) fn matches(entity: &Value, field: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(wanted) => entity.get(field).and_then(Value::as_str) == Some(wanted),
        None => true,
    }
}

/// Current time as RFC 3339 text.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

/// `PREFIX-YYYYMMDD-<hex>` with `hex_len` random hex digits.
pub(crate) fn generated_id(prefix: &str, hex_len: usize, upper: bool) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    let suffix = &hex[..hex_len.min(hex.len())];
    let suffix = if upper {
        suffix.to_uppercase()
    } else {
        suffix.to_string()
    };
    format!("{prefix}-{}-{suffix}", Utc::now().format("%Y%m%d"))
}
